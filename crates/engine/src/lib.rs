//! # Ingest Engine
//!
//! Turns a desired set of live channels into supervised transcoder processes
//! writing HLS output under a per-channel directory.
//!
//! ## Features
//!
//! - Idempotent reconciliation of the supervised set (`PipelineManager::sync`)
//! - Restart with exponential backoff and a per-window restart budget
//! - Per-channel AES-128 segment keys and key-info files
//! - Deterministic transcoder argument construction
//! - Pluggable process launcher, stream resolver and health sink

pub mod args;
pub mod builder;
pub mod channel;
pub mod config;
pub mod error;
pub mod health;
pub mod keys;
pub mod pipeline;
pub mod process;
pub mod resolver;
pub mod source;

#[cfg(test)]
pub(crate) mod test_utils;

pub use args::build_transcoder_args;
pub use builder::IngestConfigBuilder;
pub use channel::{BitrateConfig, Channel, EncodingMode, Variant};
pub use config::{HlsOutputConfig, IngestConfig, RestartPolicy};
pub use error::IngestError;
pub use health::{HealthEvent, HealthSink, TracingHealthSink, health_channel};
pub use keys::{ChannelKey, KeyManager};
pub use pipeline::{ChannelState, ChannelStatus, PipelineManager, SyncReport};
pub use process::{ExitOutcome, ProcessHandle, ProcessLauncher, ProcessSpec, TranscoderLauncher};
pub use resolver::{ProviderResolver, StreamResolver};
pub use source::{ChannelSource, FileChannelSource, run_reconcile_loop};
