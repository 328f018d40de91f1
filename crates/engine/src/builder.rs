//! # Builder for IngestConfig
//!
//! ```
//! use std::time::Duration;
//! use ingest_engine::IngestConfig;
//!
//! let config = IngestConfig::builder()
//!     .with_segment_root("/var/lib/ingest/segments")
//!     .with_max_restarts(3)
//!     .with_backoff(Duration::from_secs(1), Duration::from_secs(20))
//!     .with_segment_duration(6)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.restart.max_restarts, 3);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{HlsOutputConfig, IngestConfig, RestartPolicy};
use crate::error::IngestError;

/// Builder for creating IngestConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
        }
    }

    pub fn with_segment_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.segment_root = root.into();
        self
    }

    pub fn with_transcoder_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.transcoder_path = path.into();
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.config.restart = policy;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.config.restart.max_restarts = max_restarts;
        self
    }

    /// Set the first restart delay and the cap applied to its doublings
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.restart.initial_backoff = initial;
        self.config.restart.max_backoff = max;
        self
    }

    pub fn with_tracking_window(mut self, window: Duration) -> Self {
        self.config.restart.tracking_window = window;
        self
    }

    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.config.termination_grace = grace;
        self
    }

    pub fn with_hls(mut self, hls: HlsOutputConfig) -> Self {
        self.config.hls = hls;
        self
    }

    pub fn with_segment_duration(mut self, seconds: u32) -> Self {
        self.config.hls.segment_duration = seconds;
        self
    }

    pub fn with_playlist_size(mut self, segments: u32) -> Self {
        self.config.hls.playlist_size = segments;
        self
    }

    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.config.hls.preset = preset.into();
        self
    }

    pub fn with_key_uri_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_uri_prefix = prefix.into();
        self
    }

    /// Build the configuration, rejecting values the engine cannot run with
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let config = self.config;
        if config.segment_root.as_os_str().is_empty() {
            return Err(IngestError::Config("segment root must not be empty".into()));
        }
        if config.transcoder_path.as_os_str().is_empty() {
            return Err(IngestError::Config("transcoder path must not be empty".into()));
        }
        if config.restart.max_backoff < config.restart.initial_backoff {
            return Err(IngestError::Config(
                "max backoff must not be shorter than the initial backoff".into(),
            ));
        }
        if config.hls.segment_duration == 0 || config.hls.playlist_size == 0 {
            return Err(IngestError::Config(
                "segment duration and playlist size must be positive".into(),
            ));
        }
        if !config.key_uri_prefix.starts_with('/') {
            return Err(IngestError::Config(
                "key uri prefix must start with '/'".into(),
            ));
        }
        Ok(config)
    }
}

impl Default for IngestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build() {
        let config = IngestConfigBuilder::new().build().unwrap();
        assert_eq!(config.key_uri_prefix, "/stream");
        assert_eq!(config.hls.segment_duration, 4);
        assert_eq!(config.restart, RestartPolicy::default());
    }

    #[test]
    fn test_rejects_inverted_backoff() {
        let result = IngestConfig::builder()
            .with_backoff(Duration::from_secs(10), Duration::from_secs(1))
            .build();
        assert!(matches!(result, Err(IngestError::Config(_))));
    }

    #[test]
    fn test_rejects_relative_key_prefix() {
        let result = IngestConfig::builder()
            .with_key_uri_prefix("stream")
            .build();
        assert!(result.is_err());
    }
}
