use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Panels disagree on whether ids are numbers or strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[derive(Debug, Deserialize)]
pub struct LiveStream {
    #[serde(default, deserialize_with = "string_or_number")]
    pub stream_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LiveCategory {
    #[serde(default, deserialize_with = "string_or_number")]
    pub category_id: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountResponse {
    pub user_info: Option<UserInfo>,
}

#[derive(Debug, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub auth: Value,
    #[serde(default)]
    pub status: Option<String>,
}

impl UserInfo {
    pub fn is_authenticated(&self) -> bool {
        match &self.auth {
            Value::Number(n) => n.as_i64() == Some(1),
            Value::String(s) => s.trim() == "1",
            Value::Bool(b) => *b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_stream_ids_as_string_or_number() {
        let streams: Vec<LiveStream> = serde_json::from_str(
            r#"[
                {"num":1,"name":"News","stream_id":101,"stream_icon":"","category_id":"5"},
                {"num":2,"name":"Sports","stream_id":"102","category_id":7},
                {"num":3,"name":"Broken"}
            ]"#,
        )
        .unwrap();
        assert_eq!(streams[0].stream_id.as_deref(), Some("101"));
        assert_eq!(streams[1].stream_id.as_deref(), Some("102"));
        assert_eq!(streams[1].category_id.as_deref(), Some("7"));
        assert!(streams[2].stream_id.is_none());
    }

    #[test]
    fn test_user_info_auth() {
        let account: AccountResponse =
            serde_json::from_str(r#"{"user_info":{"auth":1,"status":"Active"}}"#).unwrap();
        assert!(account.user_info.unwrap().is_authenticated());

        let account: AccountResponse =
            serde_json::from_str(r#"{"user_info":{"auth":0}}"#).unwrap();
        assert!(!account.user_info.unwrap().is_authenticated());
    }
}
