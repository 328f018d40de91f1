//! Turns a channel's source configuration into a playable URL.

use async_trait::async_trait;
use ingest_providers::{ProviderFactory, ProviderKind, StreamUrl};
use tracing::debug;

use crate::channel::Channel;
use crate::error::IngestError;

/// Resolves the transcoder input for a channel. Called before every launch,
/// so short-lived upstream tokens are refreshed on restart.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve(&self, channel: &Channel) -> Result<StreamUrl, IngestError>;
}

/// Resolves through the source providers.
#[derive(Debug, Clone)]
pub struct ProviderResolver {
    factory: ProviderFactory,
}

impl ProviderResolver {
    pub fn new(factory: ProviderFactory) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl StreamResolver for ProviderResolver {
    async fn resolve(&self, channel: &Channel) -> Result<StreamUrl, IngestError> {
        let settings = channel.provider_settings();
        if channel.source_type == ProviderKind::Direct {
            self.factory.validate(ProviderKind::Direct, &settings)?;
            return Ok(channel.source_url.clone());
        }

        let channel_id = channel
            .source_channel_id
            .as_deref()
            .ok_or_else(|| IngestError::invalid(&channel.slug, "missing source channel id"))?;
        let provider = self.factory.create(channel.source_type, settings)?;
        let url = provider.get_stream_url(channel_id).await?;
        debug!(slug = %channel.slug, provider = %channel.source_type, "Resolved stream url");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingest_providers::ProviderError;

    fn resolver() -> ProviderResolver {
        ProviderResolver::new(ProviderFactory::new(reqwest::Client::new()))
    }

    #[tokio::test]
    async fn test_direct_returns_source_url() {
        let channel = Channel::direct("news", "rtmp://origin/live/news");
        let url = resolver().resolve(&channel).await.unwrap();
        assert_eq!(url.expose(), "rtmp://origin/live/news");
    }

    #[tokio::test]
    async fn test_direct_rejects_bad_scheme() {
        let channel = Channel::direct("news", "file:///dev/zero");
        let err = resolver().resolve(&channel).await.unwrap_err();
        assert!(matches!(err, IngestError::Provider(ProviderError::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn test_panel_channel_id_is_checked_before_any_request() {
        let channel = Channel::direct("news", "http://panel.invalid")
            .with_source(ProviderKind::Xtream, "../../etc")
            .with_provider_setting("username", "demo")
            .with_provider_setting("password", "demo");
        assert!(resolver().resolve(&channel).await.is_err());
    }
}
