use super::error::ProviderError;
use super::source_provider::SourceProvider;
use super::{ProviderConfig, ProviderKind};
use crate::provider::providers::{DirectProvider, M3uProvider, XtreamProvider};
use reqwest::Client;

// A type alias for a thread-safe constructor function.
type ProviderConstructor =
    fn(ProviderConfig, Client) -> Result<Box<dyn SourceProvider>, ProviderError>;

type ProviderValidator = fn(&ProviderConfig) -> Result<(), ProviderError>;

struct ProviderEntry {
    kind: ProviderKind,
    validate: ProviderValidator,
    constructor: ProviderConstructor,
}

// Macro to create a constructor function for a given provider
macro_rules! create_constructor {
    ($name:ident, $provider:ty) => {
        fn $name(
            config: ProviderConfig,
            client: Client,
        ) -> Result<Box<dyn SourceProvider>, ProviderError> {
            Ok(Box::new(<$provider>::new(config, client)?))
        }
    };
}

create_constructor!(new_m3u, M3uProvider);
create_constructor!(new_xtream, XtreamProvider);
create_constructor!(new_direct, DirectProvider);

// Static provider registry
static PROVIDERS: &[ProviderEntry] = &[
    ProviderEntry {
        kind: ProviderKind::M3u,
        validate: M3uProvider::validate,
        constructor: new_m3u,
    },
    ProviderEntry {
        kind: ProviderKind::Xtream,
        validate: XtreamProvider::validate,
        constructor: new_xtream,
    },
    ProviderEntry {
        kind: ProviderKind::Direct,
        validate: DirectProvider::validate,
        constructor: new_direct,
    },
];

/// Checks `config` against the requirements of `kind` without building anything.
pub fn validate_config(kind: ProviderKind, config: &ProviderConfig) -> Result<(), ProviderError> {
    (entry(kind)?.validate)(config)
}

fn entry(kind: ProviderKind) -> Result<&'static ProviderEntry, ProviderError> {
    PROVIDERS
        .iter()
        .find(|entry| entry.kind == kind)
        .ok_or_else(|| ProviderError::UnknownProvider(kind.to_string()))
}

/// A factory for creating providers from configuration store records.
#[derive(Debug, Clone)]
pub struct ProviderFactory {
    client: Client,
}

impl ProviderFactory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn validate(&self, kind: ProviderKind, config: &ProviderConfig) -> Result<(), ProviderError> {
        validate_config(kind, config)
    }

    /// Builds a provider from its type name. Unknown types fail immediately.
    pub fn create_provider(
        &self,
        provider_type: &str,
        config: ProviderConfig,
    ) -> Result<Box<dyn SourceProvider>, ProviderError> {
        let kind = provider_type.parse::<ProviderKind>()?;
        self.create(kind, config)
    }

    pub fn create(
        &self,
        kind: ProviderKind,
        config: ProviderConfig,
    ) -> Result<Box<dyn SourceProvider>, ProviderError> {
        (entry(kind)?.constructor)(config, self.client.clone())
    }
}
