mod config;
mod default;
pub mod error;
pub mod factory;
pub mod providers;
pub mod source_provider;

pub use config::{ProviderConfig, ProviderKind};
pub use default::{ClientConfig, DEFAULT_UA, ProxyConfig, create_client, default_factory};
pub use error::ProviderError;
pub use factory::{ProviderFactory, validate_config};
pub use source_provider::{Provider, SourceProvider};
