use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::{
    media::{IngestChannel, StreamUrl},
    provider::{
        ProviderConfig, ProviderKind,
        error::ProviderError,
        source_provider::{Provider, SourceProvider},
    },
};

/// A single direct stream.
///
/// Config keys: `url` (required), `id`, `name`, `logo`, `category` (optional).
pub struct DirectProvider {
    pub provider: Provider,
    url: Url,
    channel: IngestChannel,
}

impl DirectProvider {
    const NAME: &'static str = "direct";
    const DEFAULT_ID: &'static str = "direct";
    const SCHEMES: &'static [&'static str] = &["http", "https", "rtmp", "rtmps", "rtsp", "srt"];

    pub fn validate(config: &ProviderConfig) -> Result<(), ProviderError> {
        config.require_url(Self::NAME, "url", Self::SCHEMES)?;
        Ok(())
    }

    pub fn new(config: ProviderConfig, client: Client) -> Result<Self, ProviderError> {
        let url = config.require_url(Self::NAME, "url", Self::SCHEMES)?;
        let id = config.get("id").unwrap_or(Self::DEFAULT_ID).to_string();
        let mut channel = IngestChannel::new(
            id.clone(),
            config.get("name").unwrap_or(&id),
            StreamUrl::new(url.as_str()),
        );
        channel.logo_url = config.get("logo").map(str::to_string);
        channel.category = config.get("category").map(str::to_string);

        Ok(Self {
            provider: Provider::new(ProviderKind::Direct, client),
            url,
            channel,
        })
    }
}

#[async_trait]
impl SourceProvider for DirectProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Direct
    }

    async fn get_channels(&self) -> Result<Vec<IngestChannel>, ProviderError> {
        Ok(vec![self.channel.clone()])
    }

    async fn get_stream_url(&self, channel_id: &str) -> Result<StreamUrl, ProviderError> {
        if channel_id != self.channel.id {
            return Err(ProviderError::ChannelNotFound(channel_id.to_string()));
        }
        Ok(self.channel.stream_url.clone())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.url.scheme() {
            "http" | "https" => self.provider.get_ok(self.url.clone()).await.map(|_| ()),
            scheme => {
                debug!(scheme, "No HTTP probe available, assuming reachable");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_catalog_has_single_entry() {
        let config = ProviderConfig::new()
            .with("url", "rtmp://origin.example.com/live/stream")
            .with("name", "Origin");
        let provider = DirectProvider::new(config, Client::new()).unwrap();

        let channels = provider.get_channels().await.unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id, "direct");
        assert_eq!(channels[0].name, "Origin");

        let url = provider.get_stream_url("direct").await.unwrap();
        assert_eq!(url.expose(), "rtmp://origin.example.com/live/stream");
        assert!(matches!(
            provider.get_stream_url("other").await,
            Err(ProviderError::ChannelNotFound(_))
        ));
    }

    #[test]
    fn test_direct_requires_url() {
        assert!(matches!(
            DirectProvider::validate(&ProviderConfig::new()),
            Err(ProviderError::MissingConfig { key: "url", .. })
        ));
        assert!(DirectProvider::validate(&ProviderConfig::new().with("url", "file:///etc/passwd")).is_err());
    }
}
