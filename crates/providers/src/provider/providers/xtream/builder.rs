use async_trait::async_trait;
use reqwest::Client;
use rustc_hash::FxHashMap;
use tracing::debug;
use url::Url;

use super::models::{AccountResponse, LiveCategory, LiveStream};
use crate::{
    media::{IngestChannel, StreamUrl},
    provider::{
        ProviderConfig, ProviderKind,
        error::ProviderError,
        source_provider::{Provider, SourceProvider},
    },
};

/// Panel style provider API.
///
/// Config keys: `host`, `username`, `password` (required), `ext` (optional,
/// `ts` or `m3u8`, default `ts`).
pub struct XtreamProvider {
    pub provider: Provider,
    host: Url,
    username: String,
    password: String,
    ext: &'static str,
}

impl XtreamProvider {
    const NAME: &'static str = "xtream";

    const API_PATH: &'static str = "player_api.php";

    const ACTION_LIVE_STREAMS: &'static str = "get_live_streams";

    const ACTION_LIVE_CATEGORIES: &'static str = "get_live_categories";

    pub fn validate(config: &ProviderConfig) -> Result<(), ProviderError> {
        config.require_url(Self::NAME, "host", &["http", "https"])?;
        config.require(Self::NAME, "username")?;
        config.require(Self::NAME, "password")?;
        Self::parse_ext(config)?;
        Ok(())
    }

    fn parse_ext(config: &ProviderConfig) -> Result<&'static str, ProviderError> {
        match config.get("ext") {
            None | Some("ts") => Ok("ts"),
            Some("m3u8") => Ok("m3u8"),
            Some(_) => Err(ProviderError::InvalidConfig {
                key: "ext",
                reason: "must be `ts` or `m3u8`".to_string(),
            }),
        }
    }

    pub fn new(config: ProviderConfig, client: Client) -> Result<Self, ProviderError> {
        Self::validate(&config)?;
        let host = config.require_url(Self::NAME, "host", &["http", "https"])?;
        Ok(Self {
            provider: Provider::new(ProviderKind::Xtream, client),
            host,
            username: config.require(Self::NAME, "username")?.to_string(),
            password: config.require(Self::NAME, "password")?.to_string(),
            ext: Self::parse_ext(&config)?,
        })
    }

    fn base(&self) -> Result<Url, ProviderError> {
        let mut url = self.host.clone();
        url.set_query(None);
        url.set_fragment(None);
        if url.cannot_be_a_base() {
            return Err(ProviderError::InvalidConfig {
                key: "host",
                reason: "URL cannot be a base".to_string(),
            });
        }
        Ok(url)
    }

    fn api_url(&self, action: Option<&str>) -> Result<Url, ProviderError> {
        let mut url = self.base()?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| ProviderError::InvalidConfig {
                key: "host",
                reason: "URL cannot be a base".to_string(),
            })?;
            segments.pop_if_empty().push(Self::API_PATH);
        }
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("username", &self.username)
                .append_pair("password", &self.password);
            if let Some(action) = action {
                query.append_pair("action", action);
            }
        }
        Ok(url)
    }

    /// `{host}/live/{username}/{password}/{stream_id}.{ext}`
    pub fn stream_url(&self, stream_id: &str) -> Result<StreamUrl, ProviderError> {
        let file_name = format!("{stream_id}.{}", self.ext);
        let mut url = self.base()?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidConfig {
                key: "host",
                reason: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend([
                "live",
                self.username.as_str(),
                self.password.as_str(),
                file_name.as_str(),
            ]);
        Ok(StreamUrl::new(url.to_string()))
    }

    async fn get_categories(&self) -> Result<FxHashMap<String, String>, ProviderError> {
        let url = self.api_url(Some(Self::ACTION_LIVE_CATEGORIES))?;
        let categories = self
            .provider
            .get_ok(url)
            .await?
            .json::<Vec<LiveCategory>>()
            .await?;

        Ok(categories
            .into_iter()
            .filter_map(|c| Some((c.category_id?, c.category_name?)))
            .collect())
    }
}

#[async_trait]
impl SourceProvider for XtreamProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Xtream
    }

    async fn get_channels(&self) -> Result<Vec<IngestChannel>, ProviderError> {
        let url = self.api_url(Some(Self::ACTION_LIVE_STREAMS))?;
        let streams = self
            .provider
            .get_ok(url)
            .await?
            .json::<Vec<LiveStream>>()
            .await?;

        // categories are cosmetic, a failure here must not hide the catalog
        let categories = match self.get_categories().await {
            Ok(categories) => categories,
            Err(e) => {
                debug!(error = %e, "Failed to fetch live categories");
                FxHashMap::default()
            }
        };

        let mut channels = Vec::with_capacity(streams.len());
        let mut skipped = 0usize;
        for stream in streams {
            let Some(id) = stream.stream_id else {
                skipped += 1;
                continue;
            };
            let name = stream
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| id.clone());
            let stream_url = self.stream_url(&id)?;
            let mut channel = IngestChannel::new(id, name, stream_url);
            channel.logo_url = stream.stream_icon.filter(|icon| !icon.trim().is_empty());
            channel.category = stream
                .category_id
                .and_then(|cid| categories.get(&cid).cloned());
            channels.push(channel);
        }

        debug!(channels = channels.len(), skipped, "Fetched panel catalog");
        Ok(channels)
    }

    async fn get_stream_url(&self, channel_id: &str) -> Result<StreamUrl, ProviderError> {
        // the panel serves any stream id directly, no catalog walk needed
        let id = channel_id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ProviderError::ChannelNotFound(channel_id.to_string()));
        }
        self.stream_url(id)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let url = self.api_url(None)?;
        let account = self
            .provider
            .get_ok(url)
            .await?
            .json::<AccountResponse>()
            .await?;

        match account.user_info {
            Some(info) if info.is_authenticated() => Ok(()),
            _ => Err(ProviderError::AuthRejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> XtreamProvider {
        let config = ProviderConfig::new()
            .with("host", "http://panel.example.com:8080/")
            .with("username", "alice")
            .with("password", "s3cret");
        XtreamProvider::new(config, Client::new()).unwrap()
    }

    #[test]
    fn test_api_url_carries_credentials_and_action() {
        let url = provider().api_url(Some("get_live_streams")).unwrap();
        assert_eq!(url.path(), "/player_api.php");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("username".to_string(), "alice".to_string())));
        assert!(pairs.contains(&("action".to_string(), "get_live_streams".to_string())));
    }

    #[tokio::test]
    async fn test_stream_url_layout() {
        let url = provider().get_stream_url("101").await.unwrap();
        assert_eq!(
            url.expose(),
            "http://panel.example.com:8080/live/alice/s3cret/101.ts"
        );
        assert!(provider().get_stream_url("../etc").await.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_ext() {
        let config = ProviderConfig::new()
            .with("host", "http://panel.example.com")
            .with("username", "alice")
            .with("password", "s3cret")
            .with("ext", "mkv");
        assert!(matches!(
            XtreamProvider::validate(&config),
            Err(ProviderError::InvalidConfig { key: "ext", .. })
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_xtream_live_catalog() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();

        let channels = provider().get_channels().await;
        println!("{channels:?}");
    }
}
