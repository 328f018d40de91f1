use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use tokio::io::BufReader;
use tokio_util::io::StreamReader;
use tracing::debug;
use url::Url;

use crate::{
    media::IngestChannel,
    playlist::parse_playlist,
    provider::{
        ProviderConfig, ProviderKind,
        error::ProviderError,
        source_provider::{Provider, SourceProvider},
    },
};

/// Playlist based IPTV source.
///
/// Config keys: `url` (required, absolute http/https URL of the catalog).
pub struct M3uProvider {
    pub provider: Provider,
    url: Url,
}

impl M3uProvider {
    const NAME: &'static str = "m3u";

    pub fn validate(config: &ProviderConfig) -> Result<(), ProviderError> {
        config.require_url(Self::NAME, "url", &["http", "https"])?;
        Ok(())
    }

    pub fn new(config: ProviderConfig, client: Client) -> Result<Self, ProviderError> {
        let url = config.require_url(Self::NAME, "url", &["http", "https"])?;
        Ok(Self {
            provider: Provider::new(ProviderKind::M3u, client),
            url,
        })
    }
}

#[async_trait]
impl SourceProvider for M3uProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::M3u
    }

    async fn get_channels(&self) -> Result<Vec<IngestChannel>, ProviderError> {
        let response = self.provider.get_ok(self.url.clone()).await?;

        // stream the body through the parser instead of buffering the catalog
        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::other(e.without_url()));
        let reader = BufReader::new(StreamReader::new(body));
        let channels = parse_playlist(reader).await?;

        debug!(channels = channels.len(), "Fetched playlist catalog");
        Ok(channels)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        // status only, the body is dropped unread
        self.provider.get_ok(self.url.clone()).await.map(|_| ())
    }
}
