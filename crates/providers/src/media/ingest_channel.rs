use serde::{Deserialize, Serialize};
use std::fmt;

use super::StreamUrl;

/// A single entry of an upstream catalog.
///
/// Produced fresh on every catalog fetch and never persisted. The stream URL
/// is skipped during serialization so a catalog can be handed to the admin
/// layer without leaking upstream locations.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IngestChannel {
    // provider scoped id, e.g. the `tvg-id` of a playlist entry
    pub id: String,
    // display name, falls back to the id
    pub name: String,
    pub logo_url: Option<String>,
    pub category: Option<String>,
    #[serde(skip)]
    pub stream_url: StreamUrl,
}

impl IngestChannel {
    pub fn new(id: impl Into<String>, name: impl Into<String>, stream_url: StreamUrl) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            logo_url: None,
            category: None,
            stream_url,
        }
    }
}

impl fmt::Display for IngestChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category {
            Some(category) => write!(f, "{} - {} [{}]", self.id, self.name, category),
            None => write!(f, "{} - {}", self.id, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_skips_stream_url() {
        let mut channel = IngestChannel::new(
            "news.us",
            "News",
            StreamUrl::new("http://upstream/live/u/p/1.ts"),
        );
        channel.category = Some("News".to_string());

        let json = serde_json::to_string(&channel).unwrap();
        assert!(!json.contains("upstream"));
        assert!(!json.contains("stream_url"));

        let back: IngestChannel = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "news.us");
        assert!(back.stream_url.is_empty());
    }
}
