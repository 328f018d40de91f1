//! # Ingest Providers
//!
//! Normalizes heterogeneous upstream sources into a uniform channel catalog
//! and a per-channel stream URL resolver.
//!
//! ## Supported providers
//!
//! - `m3u`: playlist based IPTV sources (`#EXTM3U` catalogs, stream parsed)
//! - `xtream`: panel style provider APIs (host / username / password)
//! - `direct`: a single direct stream URL
//!
//! Providers hold no state between calls: every catalog fetch and every
//! stream URL resolution goes back to the upstream. Resolved stream URLs are
//! wrapped in [`StreamUrl`] which never prints its contents.

pub mod media;
pub mod playlist;
pub mod provider;

pub use media::{IngestChannel, StreamUrl};
pub use provider::{
    ClientConfig, ProviderConfig, ProviderError, ProviderFactory, ProviderKind, ProxyConfig,
    SourceProvider, create_client, default_factory, validate_config,
};
