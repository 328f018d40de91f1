use thiserror::Error;

/// Errors raised by the provider layer.
///
/// None of the variants carry upstream URLs or credentials: HTTP errors are
/// stripped of their URL on conversion and config errors only name the key.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("unknown provider type: {0}")]
    UnknownProvider(String),
    #[error("{provider} provider requires config key `{key}`")]
    MissingConfig {
        provider: &'static str,
        key: &'static str,
    },
    #[error("invalid value for config key `{key}`: {reason}")]
    InvalidConfig { key: &'static str, reason: String },
    #[error("http error: {0}")]
    HttpError(reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("upstream request timed out")]
    Timeout,
    #[error("playlist format error: {0}")]
    Format(String),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("channel not found: {0}")]
    ChannelNotFound(String),
    #[error("upstream rejected the configured credentials")]
    AuthRejected,
    #[error("http client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::HttpError(err.without_url())
        }
    }
}

impl ProviderError {
    /// Configuration errors are permanent; everything else may succeed on retry.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ProviderError::UnknownProvider(_)
                | ProviderError::MissingConfig { .. }
                | ProviderError::InvalidConfig { .. }
        )
    }
}
