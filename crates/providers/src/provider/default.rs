use super::{error::ProviderError, factory::ProviderFactory};
use reqwest::Client;
use rustls::{ClientConfig as TlsClientConfig, crypto::ring};
use rustls_platform_verifier::BuilderVerifierExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// HTTP client settings shared by every provider.
///
/// The overall timeout bounds every upstream call, including streaming a
/// whole catalog body, so a hung upstream cannot stall an ingest cycle.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    pub proxy: Option<ProxyConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_UA.to_string(),
            proxy: None,
        }
    }
}

pub fn create_client(config: &ClientConfig) -> Result<Client, ProviderError> {
    let provider = Arc::new(ring::default_provider());
    let tls_config = TlsClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ProviderError::Client(format!("tls protocol versions: {e}")))?
        .with_platform_verifier()
        .map_err(|e| ProviderError::Client(format!("platform verifier: {e}")))?
        .with_no_client_auth();

    let mut builder = Client::builder()
        .use_preconfigured_tls(tls_config)
        .user_agent(&config.user_agent)
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout);

    if let Some(proxy_config) = &config.proxy {
        let mut proxy = reqwest::Proxy::all(&proxy_config.url)
            .map_err(|_| ProviderError::InvalidConfig {
                key: "proxy",
                reason: "invalid proxy URL".to_string(),
            })?;
        if let (Some(username), Some(password)) = (&proxy_config.username, &proxy_config.password)
        {
            proxy = proxy.basic_auth(username, password);
        }
        builder = builder.proxy(proxy);
        debug!("Using configured proxy for provider requests");
    }

    builder.build().map_err(|e| ProviderError::Client(e.without_url().to_string()))
}

/// Returns a new `ProviderFactory` backed by a client with default settings.
pub fn default_factory() -> Result<ProviderFactory, ProviderError> {
    let client = create_client(&ClientConfig::default())?;
    Ok(ProviderFactory::new(client))
}
