//! Per-channel supervision loop.
//!
//! One supervisor task owns at most one transcoder at a time. It prepares the
//! output directory, resolves the input, launches, and on exit either restarts
//! with exponential backoff or gives up once the restart budget is spent.
//! Cancellation is observed at every await point.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::{RestartDecision, RestartTracker};
use super::status::{ChannelState, ChannelStatus};
use crate::args::build_transcoder_args;
use crate::channel::Channel;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::health::HealthSink;
use crate::keys::KeyManager;
use crate::process::{ExitOutcome, ProcessHandle, ProcessLauncher, ProcessSpec};
use crate::resolver::StreamResolver;

/// Services shared by every supervisor.
pub(crate) struct SupervisorContext {
    pub(crate) config: IngestConfig,
    pub(crate) keys: Arc<KeyManager>,
    pub(crate) launcher: Arc<dyn ProcessLauncher>,
    pub(crate) resolver: Arc<dyn StreamResolver>,
}

/// Shared status slot; every update is forwarded to the health sink.
#[derive(Clone)]
pub(crate) struct StatusCell {
    slug: Arc<str>,
    status: Arc<RwLock<ChannelStatus>>,
    sink: Arc<dyn HealthSink>,
}

impl StatusCell {
    pub(crate) fn new(slug: &str, sink: Arc<dyn HealthSink>) -> Self {
        Self {
            slug: Arc::from(slug),
            status: Arc::new(RwLock::new(ChannelStatus::new())),
            sink,
        }
    }

    pub(crate) fn snapshot(&self) -> ChannelStatus {
        self.status.read().clone()
    }

    fn update(&self, f: impl FnOnce(&mut ChannelStatus)) {
        let snapshot = {
            let mut status = self.status.write();
            let previous = status.state;
            f(&mut status);
            if status.state != previous {
                status.since = SystemTime::now();
            }
            status.clone()
        };
        self.sink.on_transition(&self.slug, &snapshot);
    }

    fn set_state(&self, state: ChannelState) {
        self.update(|status| {
            status.state = state;
            status.pid = None;
        });
    }
}

enum RunOutcome {
    Exited(ExitOutcome),
    Failed(IngestError),
    Cancelled,
}

pub(crate) struct Supervisor {
    pub(crate) channel: Channel,
    pub(crate) context: Arc<SupervisorContext>,
    pub(crate) status: StatusCell,
    pub(crate) cancel: CancellationToken,
}

impl Supervisor {
    pub(crate) async fn run(self, predecessor: Option<JoinHandle<()>>) {
        let slug = self.channel.slug.clone();

        // the previous generation must release the output directory first;
        // it is already cancelled, so this is bounded by the termination grace
        if let Some(previous) = predecessor {
            if let Err(e) = previous.await {
                warn!(slug = %slug, error = %e, "Previous supervisor failed");
            }
            if self.cancel.is_cancelled() {
                self.status.set_state(ChannelState::Stopped);
                return;
            }
        }

        let mut tracker = RestartTracker::new(self.context.config.restart.clone());
        loop {
            self.status.set_state(ChannelState::Starting);
            let started = Instant::now();

            let exit_code = match self.run_once().await {
                RunOutcome::Cancelled => break,
                RunOutcome::Exited(exit) => {
                    warn!(
                        slug = %slug,
                        code = ?exit.code,
                        ran_for = ?started.elapsed(),
                        "Transcoder exited unexpectedly"
                    );
                    exit.code
                }
                RunOutcome::Failed(e) => {
                    warn!(slug = %slug, error = %e, "Transcoder run failed");
                    None
                }
            };

            match tracker.on_exit(started.elapsed()) {
                RestartDecision::GiveUp => {
                    self.status.update(|status| {
                        status.state = ChannelState::Fatal;
                        status.pid = None;
                        status.last_exit_code = exit_code;
                        status.last_failure = Some(SystemTime::now());
                    });
                    return;
                }
                RestartDecision::Retry { attempt, delay } => {
                    self.status.update(|status| {
                        status.state = ChannelState::Backoff { attempt, delay };
                        status.pid = None;
                        status.restarts = attempt;
                        status.last_exit_code = exit_code;
                        status.last_failure = Some(SystemTime::now());
                    });
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                }
            }
        }

        self.status.set_state(ChannelState::Stopped);
        debug!(slug = %slug, "Supervisor stopped");
    }

    async fn run_once(&self) -> RunOutcome {
        let launched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return RunOutcome::Cancelled,
            launched = self.launch() => launched,
        };
        let mut handle = match launched {
            Ok(handle) => handle,
            Err(e) => return RunOutcome::Failed(e),
        };

        let pid = handle.id();
        self.status.update(|status| {
            status.state = ChannelState::Running;
            status.pid = pid;
        });

        let exited = tokio::select! {
            result = handle.wait() => Some(result),
            _ = self.cancel.cancelled() => None,
        };
        match exited {
            Some(Ok(exit)) => RunOutcome::Exited(exit),
            Some(Err(e)) => RunOutcome::Failed(e),
            None => {
                self.stop(handle.as_mut()).await;
                RunOutcome::Cancelled
            }
        }
    }

    async fn stop(&self, handle: &mut dyn ProcessHandle) {
        let grace = self.context.config.termination_grace;
        match handle.terminate(grace).await {
            Ok(exit) => info!(slug = %self.channel.slug, code = ?exit.code, "Transcoder stopped"),
            Err(e) => warn!(slug = %self.channel.slug, error = %e, "Failed to stop transcoder"),
        }
    }

    async fn launch(&self) -> Result<Box<dyn ProcessHandle>, IngestError> {
        let context = &self.context;
        let channel = &self.channel;
        let segment_root = &context.config.segment_root;

        let dir = channel.output_dir(segment_root);
        tokio::fs::create_dir_all(&dir).await?;
        if channel.bitrate.is_multi_variant() {
            for variant in &channel.bitrate.variants {
                tokio::fs::create_dir_all(dir.join(variant.label())).await?;
            }
        }

        if channel.bitrate.encrypt {
            let keys = Arc::clone(&context.keys);
            let slug = channel.slug.clone();
            tokio::task::spawn_blocking(move || keys.write_key_info(&slug)).await??;
        }

        let input = context.resolver.resolve(channel).await?;
        let args = build_transcoder_args(channel, input.expose(), segment_root, &context.config.hls);
        debug!(slug = %channel.slug, args = args.len(), "Launching transcoder");

        let spec = ProcessSpec::new(&channel.slug, &context.config.transcoder_path, args)
            .with_secret(input.expose());
        context.launcher.launch(spec).await
    }
}
