use anyhow::{Context, Result};
use ingest_engine::{HlsOutputConfig, IngestConfig, IngestError, RestartPolicy};
use ingest_providers::{ClientConfig, ProxyConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory every channel writes its HLS output under
    pub segment_root: PathBuf,

    /// Transcoder executable
    pub transcoder_path: PathBuf,

    /// Prefix of the key URI written into key-info files
    pub key_uri_prefix: String,

    /// Seconds between channel file polls
    pub poll_interval: u64,

    /// Seconds a transcoder gets to exit before it is killed
    pub termination_grace: u64,

    pub restart: RestartSection,
    pub hls: HlsSection,
    pub http: HttpSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartSection {
    pub max_restarts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub tracking_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HlsSection {
    pub segment_duration: u32,
    pub playlist_size: u32,
    pub delete_segments: bool,
    pub video_codec: String,
    pub preset: String,
    pub gop_size: u32,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let engine = IngestConfig::default();
        Self {
            segment_root: engine.segment_root,
            transcoder_path: engine.transcoder_path,
            key_uri_prefix: engine.key_uri_prefix,
            poll_interval: 30,
            termination_grace: engine.termination_grace.as_secs(),
            restart: RestartSection::default(),
            hls: HlsSection::default(),
            http: HttpSection::default(),
        }
    }
}

impl Default for RestartSection {
    fn default() -> Self {
        let policy = RestartPolicy::default();
        Self {
            max_restarts: policy.max_restarts,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            tracking_window_secs: policy.tracking_window.as_secs(),
        }
    }
}

impl Default for HlsSection {
    fn default() -> Self {
        let hls = HlsOutputConfig::default();
        Self {
            segment_duration: hls.segment_duration,
            playlist_size: hls.playlist_size,
            delete_segments: hls.delete_segments,
            video_codec: hls.video_codec,
            preset: hls.preset,
            gop_size: hls.gop_size,
            audio_codec: hls.audio_codec,
            audio_bitrate_kbps: hls.audio_bitrate_kbps,
        }
    }
}

impl Default for HttpSection {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            timeout_secs: client.timeout.as_secs(),
            connect_timeout_secs: client.connect_timeout.as_secs(),
            user_agent: None,
            proxy: None,
            proxy_username: None,
            proxy_password: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, falling back to defaults when no file is given.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => {
                let content = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read configuration file {}", path.display())
                })?;
                toml::from_str(&content)
                    .map_err(|e| IngestError::toml(&content, &e))
                    .with_context(|| format!("Failed to parse configuration file {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1))
    }

    /// Engine configuration, validated by the engine's builder.
    pub fn ingest_config(&self) -> Result<IngestConfig> {
        let hls = &self.hls;
        IngestConfig::builder()
            .with_segment_root(&self.segment_root)
            .with_transcoder_path(&self.transcoder_path)
            .with_key_uri_prefix(&self.key_uri_prefix)
            .with_termination_grace(Duration::from_secs(self.termination_grace))
            .with_restart_policy(RestartPolicy {
                max_restarts: self.restart.max_restarts,
                initial_backoff: Duration::from_millis(self.restart.initial_backoff_ms),
                max_backoff: Duration::from_millis(self.restart.max_backoff_ms),
                tracking_window: Duration::from_secs(self.restart.tracking_window_secs),
            })
            .with_hls(HlsOutputConfig {
                segment_duration: hls.segment_duration,
                playlist_size: hls.playlist_size,
                delete_segments: hls.delete_segments,
                video_codec: hls.video_codec.clone(),
                preset: hls.preset.clone(),
                gop_size: hls.gop_size,
                audio_codec: hls.audio_codec.clone(),
                audio_bitrate_kbps: hls.audio_bitrate_kbps,
            })
            .build()
            .context("Invalid engine configuration")
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig {
            timeout: Duration::from_secs(self.http.timeout_secs),
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            ..ClientConfig::default()
        };
        if let Some(user_agent) = &self.http.user_agent {
            config.user_agent = user_agent.clone();
        }
        config.proxy = self.http.proxy.as_ref().map(|url| ProxyConfig {
            url: url.clone(),
            username: self.http.proxy_username.clone(),
            password: self.http.proxy_password.clone(),
        });
        config
    }
}
