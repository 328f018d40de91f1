use std::path::PathBuf;
use std::time::Duration;

use crate::keys::DEFAULT_KEY_URI_PREFIX;

/// Configuration for the ingest engine
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Root directory; every channel writes under `{segment_root}/{slug}`
    pub segment_root: PathBuf,

    /// Transcoder executable, resolved through `PATH` when relative
    pub transcoder_path: PathBuf,

    pub restart: RestartPolicy,

    /// How long a terminated transcoder may take to exit before it is killed
    pub termination_grace: Duration,

    pub hls: HlsOutputConfig,

    /// Prefix of the key URI written into each channel's key-info file
    pub key_uri_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            segment_root: PathBuf::from("segments"),
            transcoder_path: PathBuf::from("ffmpeg"),
            restart: RestartPolicy::default(),
            termination_grace: Duration::from_secs(5),
            hls: HlsOutputConfig::default(),
            key_uri_prefix: DEFAULT_KEY_URI_PREFIX.to_string(),
        }
    }
}

impl IngestConfig {
    pub fn builder() -> crate::builder::IngestConfigBuilder {
        crate::builder::IngestConfigBuilder::new()
    }
}

// --- Restart Policy ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restarts allowed inside one tracking window before the channel is marked fatal
    pub max_restarts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// A run lasting at least this long resets the restart counter
    pub tracking_window: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            tracking_window: Duration::from_secs(60),
        }
    }
}

// --- HLS Output ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsOutputConfig {
    /// Target segment length in seconds
    pub segment_duration: u32,
    /// Number of segments kept in each media playlist
    pub playlist_size: u32,
    pub delete_segments: bool,
    pub video_codec: String,
    pub preset: String,
    /// Keyframe interval in frames
    pub gop_size: u32,
    pub audio_codec: String,
    pub audio_bitrate_kbps: u32,
}

impl Default for HlsOutputConfig {
    fn default() -> Self {
        Self {
            segment_duration: 4,
            playlist_size: 6,
            delete_segments: true,
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            gop_size: 48,
            audio_codec: "aac".to_string(),
            audio_bitrate_kbps: 128,
        }
    }
}
