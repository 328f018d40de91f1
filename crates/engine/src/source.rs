//! Desired-channel sources and the periodic reconcile loop.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::error::IngestError;
use crate::pipeline::PipelineManager;

/// Where the desired channel set comes from.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    async fn desired_channels(&self) -> Result<Vec<Channel>, IngestError>;
}

#[derive(Debug, Deserialize)]
struct ChannelFile {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonChannels {
    List(Vec<Channel>),
    File(ChannelFile),
}

/// Channel list stored in a TOML (`[[channels]]`) or JSON file, re-read on every poll.
#[derive(Debug, Clone)]
pub struct FileChannelSource {
    path: PathBuf,
}

impl FileChannelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChannelSource for FileChannelSource {
    async fn desired_channels(&self) -> Result<Vec<Channel>, IngestError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            IngestError::Source(format!("cannot read {}: {e}", self.path.display()))
        })?;
        parse_channels(&self.path, &text)
    }
}

/// Parse a channel file, choosing JSON or TOML by extension.
pub fn parse_channels(path: &Path, text: &str) -> Result<Vec<Channel>, IngestError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        let parsed = serde_json::from_str::<JsonChannels>(text).map_err(|e| IngestError::json(&e))?;
        Ok(match parsed {
            JsonChannels::List(channels) => channels,
            JsonChannels::File(file) => file.channels,
        })
    } else {
        toml::from_str::<ChannelFile>(text)
            .map(|file| file.channels)
            .map_err(|e| IngestError::toml(text, &e))
    }
}

/// Poll `source` every `interval` and sync the manager until `cancel` fires.
///
/// A failed poll or a rejected channel set keeps the currently supervised set.
/// Stopping the pipelines afterwards is the caller's job.
pub async fn run_reconcile_loop(
    manager: &PipelineManager,
    source: &dyn ChannelSource,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let desired = tokio::select! {
            _ = cancel.cancelled() => break,
            desired = source.desired_channels() => desired,
        };
        let channels = match desired {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Channel source poll failed, keeping current set");
                continue;
            }
        };

        match manager.sync(&channels) {
            Ok(report) if report.is_noop() => debug!(unchanged = report.unchanged, "No channel changes"),
            Ok(report) => info!(
                started = report.started.len(),
                restarted = report.restarted.len(),
                stopped = report.stopped.len(),
                "Reconciled channels"
            ),
            Err(e) => warn!(error = %e, "Rejected desired channel set, keeping current set"),
        }
    }
    debug!("Reconcile loop finished");
}
