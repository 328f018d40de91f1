use std::fmt;

use serde::Deserialize;

/// A resolved, playable stream URL.
///
/// Upstream URLs routinely embed credentials (panel APIs put the username and
/// password in the path), so this type never prints its contents. Code that
/// really needs the value, i.e. the transcoder launch, calls [`StreamUrl::expose`].
/// It can be read from configuration but has no `Serialize` impl.
#[derive(Clone, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct StreamUrl(String);

impl StreamUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Scheme of the URL, lowercased. Safe to log.
    pub fn scheme(&self) -> Option<String> {
        self.0
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
    }
}

impl fmt::Debug for StreamUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamUrl(<redacted>)")
    }
}

impl fmt::Display for StreamUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

impl From<String> for StreamUrl {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StreamUrl {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_url_is_never_printed() {
        let url = StreamUrl::new("http://host/live/user/secret/1.ts");
        assert_eq!(format!("{url}"), "<redacted>");
        assert!(!format!("{url:?}").contains("secret"));
        assert_eq!(url.expose(), "http://host/live/user/secret/1.ts");
        assert_eq!(url.scheme().as_deref(), Some("http"));
    }
}
