//! Scripted stand-ins for the transcoder and the stream resolver.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ingest_providers::StreamUrl;
use parking_lot::Mutex;

use crate::channel::Channel;
use crate::error::IngestError;
use crate::process::{ExitOutcome, ProcessHandle, ProcessLauncher, ProcessSpec};
use crate::resolver::StreamResolver;

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub(crate) async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[derive(Debug, Clone, Copy)]
enum Script {
    Exit { after: Duration, code: i32 },
    RunUntilTerminated,
    FailToLaunch,
}

pub(crate) struct ScriptedLauncher {
    script: Script,
    terminate_delay: Duration,
    launches: AtomicUsize,
    terminations: Arc<AtomicUsize>,
    live: Arc<LiveCount>,
    next_pid: AtomicU32,
    last_spec: Mutex<Option<ProcessSpec>>,
}

/// Handles that have not exited yet, and the most seen at once.
#[derive(Default)]
struct LiveCount {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl LiveCount {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedLauncher {
    fn new(script: Script, terminate_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script,
            terminate_delay,
            launches: AtomicUsize::new(0),
            terminations: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(LiveCount::default()),
            next_pid: AtomicU32::new(1000),
            last_spec: Mutex::new(None),
        })
    }

    /// Every run exits with `code` after `after`.
    pub(crate) fn exiting(after: Duration, code: i32) -> Arc<Self> {
        Self::new(Script::Exit { after, code }, Duration::ZERO)
    }

    /// Every run stays up until terminated.
    pub(crate) fn long_running() -> Arc<Self> {
        Self::new(Script::RunUntilTerminated, Duration::ZERO)
    }

    /// Every run stays up until terminated, and takes `delay` to go down.
    pub(crate) fn slow_to_terminate(delay: Duration) -> Arc<Self> {
        Self::new(Script::RunUntilTerminated, delay)
    }

    /// Every launch attempt fails.
    pub(crate) fn failing() -> Arc<Self> {
        Self::new(Script::FailToLaunch, Duration::ZERO)
    }

    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Most transcoders alive at the same time.
    pub(crate) fn peak_live(&self) -> usize {
        self.live.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn last_args(&self) -> Option<Vec<String>> {
        self.last_spec.lock().as_ref().map(|spec| spec.args.clone())
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(&self, spec: ProcessSpec) -> Result<Box<dyn ProcessHandle>, IngestError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        *self.last_spec.lock() = Some(spec);
        if let Script::FailToLaunch = self.script {
            return Err(IngestError::Launch("scripted failure".into()));
        }
        self.live.enter();
        Ok(Box::new(ScriptedHandle {
            pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
            script: self.script,
            terminate_delay: self.terminate_delay,
            terminations: Arc::clone(&self.terminations),
            live: Arc::clone(&self.live),
        }))
    }
}

struct ScriptedHandle {
    pid: u32,
    script: Script,
    terminate_delay: Duration,
    terminations: Arc<AtomicUsize>,
    live: Arc<LiveCount>,
}

#[async_trait]
impl ProcessHandle for ScriptedHandle {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    async fn wait(&mut self) -> Result<ExitOutcome, IngestError> {
        match self.script {
            Script::Exit { after, code } => {
                tokio::time::sleep(after).await;
                self.live.exit();
                Ok(ExitOutcome { code: Some(code) })
            }
            Script::RunUntilTerminated | Script::FailToLaunch => {
                std::future::pending::<()>().await;
                Ok(ExitOutcome { code: None })
            }
        }
    }

    async fn terminate(&mut self, _grace: Duration) -> Result<ExitOutcome, IngestError> {
        tokio::time::sleep(self.terminate_delay).await;
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.live.exit();
        Ok(ExitOutcome { code: None })
    }
}

/// Resolves every channel to the same URL.
pub(crate) struct StaticResolver(StreamUrl);

impl Default for StaticResolver {
    fn default() -> Self {
        Self(StreamUrl::new("http://origin.example/live/source.ts"))
    }
}

#[async_trait]
impl StreamResolver for StaticResolver {
    async fn resolve(&self, _channel: &Channel) -> Result<StreamUrl, IngestError> {
        Ok(self.0.clone())
    }
}
