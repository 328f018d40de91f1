use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use super::error::ProviderError;

/// The kind of upstream a channel is ingested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Playlist based source (`#EXTM3U` catalog)
    #[serde(alias = "playlist")]
    M3u,
    /// Panel style provider API
    #[serde(alias = "panel")]
    Xtream,
    /// A direct stream URL
    #[default]
    #[serde(alias = "url")]
    Direct,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::M3u => "m3u",
            ProviderKind::Xtream => "xtream",
            ProviderKind::Direct => "direct",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m3u" | "playlist" => Ok(ProviderKind::M3u),
            "xtream" | "panel" => Ok(ProviderKind::Xtream),
            "direct" | "url" => Ok(ProviderKind::Direct),
            _ => Err(ProviderError::UnknownProvider(s.to_string())),
        }
    }
}

/// String keyed provider configuration as supplied by the configuration store.
///
/// `Debug` prints the keys only, values may be credentials.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderConfig(FxHashMap<String, String>);

impl ProviderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns the trimmed value of `key`, treating blank values as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn require(&self, provider: &'static str, key: &'static str) -> Result<&str, ProviderError> {
        self.get(key)
            .ok_or(ProviderError::MissingConfig { provider, key })
    }

    /// Requires `key` to hold an absolute URL whose scheme is one of `schemes`.
    pub fn require_url(
        &self,
        provider: &'static str,
        key: &'static str,
        schemes: &[&str],
    ) -> Result<Url, ProviderError> {
        let raw = self.require(provider, key)?;
        let url = Url::parse(raw).map_err(|e| ProviderError::InvalidConfig {
            key,
            reason: format!("not an absolute URL ({e})"),
        })?;
        if !schemes.contains(&url.scheme()) {
            return Err(ProviderError::InvalidConfig {
                key,
                reason: format!("scheme must be one of: {}", schemes.join(", ")),
            });
        }
        if url.host_str().is_none() {
            return Err(ProviderError::InvalidConfig {
                key,
                reason: "URL has no host".to_string(),
            });
        }
        Ok(url)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.keys().collect();
        keys.sort_unstable();
        f.debug_struct("ProviderConfig").field("keys", &keys).finish()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ProviderConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("m3u".parse::<ProviderKind>().unwrap(), ProviderKind::M3u);
        assert_eq!("Panel".parse::<ProviderKind>().unwrap(), ProviderKind::Xtream);
        assert_eq!("url".parse::<ProviderKind>().unwrap(), ProviderKind::Direct);
        assert!(matches!(
            "satellite".parse::<ProviderKind>(),
            Err(ProviderError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_require_url_rejects_relative_and_foreign_schemes() {
        let config = ProviderConfig::new().with("url", "/playlist.m3u");
        assert!(matches!(
            config.require_url("m3u", "url", &["http", "https"]),
            Err(ProviderError::InvalidConfig { key: "url", .. })
        ));

        let config = ProviderConfig::new().with("url", "ftp://example.com/list.m3u");
        assert!(config.require_url("m3u", "url", &["http", "https"]).is_err());

        let config = ProviderConfig::new().with("url", "https://example.com/list.m3u");
        assert!(config.require_url("m3u", "url", &["http", "https"]).is_ok());
    }

    #[test]
    fn test_blank_values_are_missing() {
        let config = ProviderConfig::new().with("username", "   ");
        assert!(matches!(
            config.require("xtream", "username"),
            Err(ProviderError::MissingConfig { key: "username", .. })
        ));
    }

    #[test]
    fn test_debug_hides_values() {
        let config = ProviderConfig::new()
            .with("username", "alice")
            .with("password", "hunter2");
        let debug = format!("{config:?}");
        assert!(debug.contains("password"));
        assert!(!debug.contains("hunter2"));
    }
}
