use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response};
use url::Url;

use super::{ProviderKind, error::ProviderError};
use crate::media::{IngestChannel, StreamUrl};

/// Shared plumbing for the concrete providers: the HTTP client and the
/// headers sent with every upstream request.
#[derive(Debug, Clone)]
pub struct Provider {
    pub kind: ProviderKind,
    pub client: Client,
    headers: HeaderMap,
}

impl Provider {
    pub fn new(kind: ProviderKind, client: Client) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        Self {
            kind,
            client,
            headers,
        }
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client.request(method, url).headers(self.headers.clone())
    }

    /// Sends a GET and maps non-success statuses to [`ProviderError::Status`].
    pub async fn get_ok(&self, url: Url) -> Result<Response, ProviderError> {
        let response = self.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }
        Ok(response)
    }
}

/// Uniform interface over heterogeneous upstream sources.
///
/// Implementations are validated at construction, hold no mutable state and
/// can be shared across tasks. Every call goes back to the upstream.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Full catalog in source order.
    async fn get_channels(&self) -> Result<Vec<IngestChannel>, ProviderError>;

    /// Resolves a playable URL for `channel_id`. For ingest use only, the
    /// result must never be handed to clients or logged.
    async fn get_stream_url(&self, channel_id: &str) -> Result<StreamUrl, ProviderError> {
        self.get_channels()
            .await?
            .into_iter()
            .find(|channel| channel.id == channel_id)
            .map(|channel| channel.stream_url)
            .ok_or_else(|| ProviderError::ChannelNotFound(channel_id.to_string()))
    }

    /// Lightweight reachability probe for the admin layer.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
