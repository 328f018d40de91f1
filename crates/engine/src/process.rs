//! Child process capability.
//!
//! The supervisor only talks to [`ProcessLauncher`] and [`ProcessHandle`], so
//! tests can swap the real transcoder for a scripted one.

use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{Pid, ProcessesToUpdate, Signal, System};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, warn};

use crate::error::IngestError;

const REDACTED: &str = "<redacted>";

/// Everything needed to start one transcoder run.
#[derive(Clone)]
pub struct ProcessSpec {
    pub slug: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    secrets: Vec<String>,
}

impl ProcessSpec {
    pub fn new(slug: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            slug: slug.into(),
            program: program.into(),
            args,
            secrets: Vec::new(),
        }
    }

    /// Register a value that must never reach the logs (the input URL, typically).
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    pub fn redact(&self, line: &str) -> String {
        redact_line(line, &self.secrets)
    }
}

impl fmt::Debug for ProcessSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSpec")
            .field("slug", &self.slug)
            .field("program", &self.program)
            .field("args", &self.args.len())
            .finish_non_exhaustive()
    }
}

/// Replace registered secrets and anything URL-shaped.
fn redact_line(line: &str, secrets: &[String]) -> String {
    let mut line = line.to_string();
    for secret in secrets {
        line = line.replace(secret.as_str(), REDACTED);
    }
    line.split(' ')
        .map(|word| if word.contains("://") { REDACTED } else { word })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// `None` when the process was ended by a signal
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// A running child.
#[async_trait]
pub trait ProcessHandle: Send {
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit. Dropping the future leaves the process running.
    async fn wait(&mut self) -> Result<ExitOutcome, IngestError>;

    /// Ask the process (and everything it spawned) to stop, escalating to a
    /// hard kill once `grace` has elapsed.
    async fn terminate(&mut self, grace: Duration) -> Result<ExitOutcome, IngestError>;
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(&self, spec: ProcessSpec) -> Result<Box<dyn ProcessHandle>, IngestError>;
}

/// Launches real transcoder processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TranscoderLauncher;

#[async_trait]
impl ProcessLauncher for TranscoderLauncher {
    async fn launch(&self, spec: ProcessSpec) -> Result<Box<dyn ProcessHandle>, IngestError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // own process group, so terminal signals go to us and not straight to the child
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            IngestError::Launch(format!("{}: {e}", spec.program.display()))
        })?;
        let pid = child.id();
        debug!(slug = %spec.slug, ?pid, args = spec.args.len(), "Transcoder started");

        // runs until the pipe closes, i.e. the whole tree has exited
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(spec.slug.clone(), stderr, spec.secrets));
        }

        Ok(Box::new(TranscoderProcess {
            slug: spec.slug,
            child,
            pid,
        }))
    }
}

async fn forward_stderr(slug: String, stderr: ChildStderr, secrets: Vec<String>) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if !line.is_empty() {
                    warn!(slug = %slug, "transcoder: {}", redact_line(line, &secrets));
                }
            }
            Err(e) => {
                debug!(slug = %slug, error = %e, "Stopped reading transcoder stderr");
                break;
            }
        }
    }
}

struct TranscoderProcess {
    slug: String,
    child: Child,
    pid: Option<u32>,
}

#[async_trait]
impl ProcessHandle for TranscoderProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    async fn wait(&mut self) -> Result<ExitOutcome, IngestError> {
        Ok(self.child.wait().await?.into())
    }

    async fn terminate(&mut self, grace: Duration) -> Result<ExitOutcome, IngestError> {
        if let Some(status) = self.child.try_wait()? {
            return Ok(status.into());
        }
        let Some(pid) = self.pid else {
            self.child.start_kill()?;
            return Ok(self.child.wait().await?.into());
        };

        let tree = tokio::task::spawn_blocking(move || ProcessTree::collect(pid)).await?;
        let signalled = tree.signal(Signal::Term);
        debug!(slug = %self.slug, pid, processes = tree.len(), signalled, "Terminating transcoder");

        let status = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(slug = %self.slug, pid, ?grace, "Transcoder ignored termination, killing");
                tree.signal(Signal::Kill);
                // the root may not support signals on this platform
                if let Err(e) = self.child.start_kill() {
                    debug!(slug = %self.slug, error = %e, "Kill after grace failed");
                }
                self.child.wait().await?
            }
        };

        // descendants that outlived the root
        let leftovers = tokio::task::spawn_blocking(move || tree.kill_survivors()).await?;
        if leftovers > 0 {
            debug!(slug = %self.slug, leftovers, "Killed orphaned transcoder children");
        }
        Ok(status.into())
    }
}

/// Snapshot of a process and its descendants.
struct ProcessTree {
    system: System,
    pids: Vec<Pid>,
}

impl ProcessTree {
    fn collect(root: u32) -> Self {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut pids = vec![Pid::from_u32(root)];
        let mut next = 0;
        while next < pids.len() {
            let parent = pids[next];
            let children: Vec<Pid> = system
                .processes()
                .iter()
                .filter(|(pid, process)| process.parent() == Some(parent) && !pids.contains(pid))
                .map(|(pid, _)| *pid)
                .collect();
            pids.extend(children);
            next += 1;
        }
        Self { system, pids }
    }

    fn len(&self) -> usize {
        self.pids.len()
    }

    /// Deliver `signal` to every process still present, returning how many accepted it.
    fn signal(&self, signal: Signal) -> usize {
        self.pids
            .iter()
            .filter_map(|pid| self.system.process(*pid))
            .filter(|process| match process.kill_with(signal) {
                Some(sent) => sent,
                None => signal == Signal::Kill && process.kill(),
            })
            .count()
    }

    fn kill_survivors(mut self) -> usize {
        let descendants: Vec<Pid> = self.pids.iter().skip(1).copied().collect();
        if descendants.is_empty() {
            return 0;
        }
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&descendants), true);
        self.pids = descendants;
        self.signal(Signal::Kill)
    }
}
