use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use ingest_providers::ProviderFactory;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use super::status::ChannelStatus;
use super::supervisor::{StatusCell, Supervisor, SupervisorContext};
use crate::channel::{Channel, validate_all};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::health::{HealthSink, TracingHealthSink};
use crate::keys::KeyManager;
use crate::process::{ProcessLauncher, TranscoderLauncher};
use crate::resolver::{ProviderResolver, StreamResolver};

/// What a `sync` call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub started: Vec<String>,
    pub restarted: Vec<String>,
    pub stopped: Vec<String>,
    pub unchanged: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.restarted.is_empty() && self.stopped.is_empty()
    }
}

/// Desired vs. running difference, computed before anything is touched.
#[derive(Debug, Default)]
struct SyncPlan<'a> {
    stop: Vec<String>,
    start: Vec<&'a Channel>,
    restart: Vec<&'a Channel>,
    unchanged: usize,
}

impl<'a> SyncPlan<'a> {
    fn diff(running: &HashMap<String, SupervisedChannel>, desired: &'a [Channel]) -> Self {
        let wanted: HashSet<&str> = desired
            .iter()
            .filter(|c| c.active)
            .map(|c| c.slug.as_str())
            .collect();

        let mut stop: Vec<String> = running
            .keys()
            .filter(|slug| !wanted.contains(slug.as_str()))
            .cloned()
            .collect();
        stop.sort();

        let mut plan = SyncPlan {
            stop,
            ..SyncPlan::default()
        };
        for channel in desired.iter().filter(|c| c.active) {
            match running.get(&channel.slug) {
                Some(entry) if entry.channel == *channel => plan.unchanged += 1,
                Some(_) => plan.restart.push(channel),
                None => plan.start.push(channel),
            }
        }
        plan
    }
}

/// Supervised channels plus workers that were told to stop and may still be
/// terminating their transcoder.
#[derive(Default)]
struct ChannelTable {
    running: HashMap<String, SupervisedChannel>,
    stopping: HashMap<String, JoinHandle<()>>,
}

struct SupervisedChannel {
    channel: Channel,
    cancel: CancellationToken,
    status: StatusCell,
    task: JoinHandle<()>,
}

/// Keeps exactly one supervised transcoder per active desired channel.
pub struct PipelineManager {
    context: Arc<SupervisorContext>,
    health: Arc<dyn HealthSink>,
    channels: Mutex<ChannelTable>,
    tracker: TaskTracker,
}

impl PipelineManager {
    /// Create a manager. The segment root is made absolute because it ends up
    /// inside key-info files the transcoder reads.
    pub fn new(
        mut config: IngestConfig,
        launcher: Arc<dyn ProcessLauncher>,
        resolver: Arc<dyn StreamResolver>,
    ) -> Result<Self, IngestError> {
        config.segment_root = std::path::absolute(&config.segment_root)?;
        let keys = KeyManager::new(&config.segment_root).with_uri_prefix(&config.key_uri_prefix);

        Ok(Self {
            context: Arc::new(SupervisorContext {
                config,
                keys: Arc::new(keys),
                launcher,
                resolver,
            }),
            health: Arc::new(TracingHealthSink),
            channels: Mutex::new(ChannelTable::default()),
            tracker: TaskTracker::new(),
        })
    }

    /// Manager running real transcoders with provider-based stream resolution.
    pub fn with_providers(config: IngestConfig, factory: ProviderFactory) -> Result<Self, IngestError> {
        Self::new(
            config,
            Arc::new(TranscoderLauncher),
            Arc::new(ProviderResolver::new(factory)),
        )
    }

    pub fn with_health_sink(mut self, sink: Arc<dyn HealthSink>) -> Self {
        self.health = sink;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.context.config
    }

    pub fn keys(&self) -> &KeyManager {
        &self.context.keys
    }

    /// Reconcile the supervised set with `desired`.
    ///
    /// The whole set is validated before anything changes. Then channels that
    /// are absent or inactive are stopped, new ones are started and changed ones
    /// are restarted. Calling it again with the same set is a no-op.
    /// Must be called from within a tokio runtime.
    pub fn sync(&self, desired: &[Channel]) -> Result<SyncReport, IngestError> {
        validate_all(desired)?;

        let mut table = self.channels.lock();
        table.stopping.retain(|_, task| !task.is_finished());
        let plan = SyncPlan::diff(&table.running, desired);
        let mut report = SyncReport {
            unchanged: plan.unchanged,
            ..SyncReport::default()
        };

        for slug in plan.stop {
            if let Some(entry) = table.running.remove(&slug) {
                entry.cancel.cancel();
                self.context.keys.forget(&slug);
                info!(slug = %slug, "Stopping channel");
                table.stopping.insert(slug.clone(), entry.task);
                report.stopped.push(slug);
            }
        }

        for channel in plan.restart {
            let predecessor = table.running.remove(&channel.slug).map(|entry| {
                entry.cancel.cancel();
                entry.task
            });
            info!(slug = %channel.slug, "Channel configuration changed, restarting");
            let entry = self.spawn(channel.clone(), predecessor);
            table.running.insert(channel.slug.clone(), entry);
            report.restarted.push(channel.slug.clone());
        }

        for channel in plan.start {
            info!(slug = %channel.slug, "Starting channel");
            let predecessor = table.stopping.remove(&channel.slug);
            let entry = self.spawn(channel.clone(), predecessor);
            table.running.insert(channel.slug.clone(), entry);
            report.started.push(channel.slug.clone());
        }

        debug!(?report, "Sync complete");
        Ok(report)
    }

    fn spawn(&self, channel: Channel, predecessor: Option<JoinHandle<()>>) -> SupervisedChannel {
        let cancel = CancellationToken::new();
        let status = StatusCell::new(&channel.slug, Arc::clone(&self.health));
        let supervisor = Supervisor {
            channel: channel.clone(),
            context: Arc::clone(&self.context),
            status: status.clone(),
            cancel: cancel.clone(),
        };
        let task = self.tracker.spawn(supervisor.run(predecessor));
        SupervisedChannel {
            channel,
            cancel,
            status,
            task,
        }
    }

    /// Stop every supervised channel and wait until all transcoders have exited.
    pub async fn stop_all(&self) {
        let drained: Vec<SupervisedChannel> = {
            let mut table = self.channels.lock();
            table.stopping.clear();
            table.running.drain().map(|(_, entry)| entry).collect()
        };
        info!(channels = drained.len(), "Stopping all channels");
        for entry in &drained {
            entry.cancel.cancel();
        }

        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Supervised channels that have not given up.
    pub fn active_count(&self) -> usize {
        self.channels
            .lock()
            .running
            .values()
            .filter(|entry| !entry.status.snapshot().is_fatal())
            .count()
    }

    pub fn status(&self, slug: &str) -> Option<ChannelStatus> {
        self.channels
            .lock()
            .running
            .get(slug)
            .map(|entry| entry.status.snapshot())
    }

    /// Status of every supervised channel, ordered by slug.
    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let mut statuses: Vec<_> = self
            .channels
            .lock()
            .running
            .iter()
            .map(|(slug, entry)| (slug.clone(), entry.status.snapshot()))
            .collect();
        statuses.sort_by(|a, b| a.0.cmp(&b.0));
        statuses
    }

    /// Replace a channel's segment key. A supervised encrypted channel is
    /// restarted so the transcoder picks the new key up; returns whether that happened.
    pub fn rotate_key(&self, slug: &str) -> Result<bool, IngestError> {
        self.context.keys.rotate_key(slug)?;

        let mut table = self.channels.lock();
        let encrypted = table
            .running
            .get(slug)
            .is_some_and(|entry| entry.channel.bitrate.encrypt);
        if !encrypted {
            return Ok(false);
        }

        let Some(previous) = table.running.remove(slug) else {
            return Ok(false);
        };
        previous.cancel.cancel();
        info!(slug, "Restarting channel after key rotation");
        let entry = self.spawn(previous.channel, Some(previous.task));
        table.running.insert(slug.to_string(), entry);
        Ok(true)
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        for entry in self.channels.get_mut().running.values() {
            entry.cancel.cancel();
        }
    }
}
