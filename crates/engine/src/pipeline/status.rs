use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Serialize;

/// Lifecycle of one supervised channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ChannelState {
    Stopped,
    /// Preparing output, resolving the source or spawning the transcoder
    Starting,
    Running,
    /// Waiting `delay` before restart `attempt`
    Backoff { attempt: u32, delay: Duration },
    /// Restart budget exhausted; stays here until the channel config changes
    Fatal,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Stopped => f.write_str("stopped"),
            ChannelState::Starting => f.write_str("starting"),
            ChannelState::Running => f.write_str("running"),
            ChannelState::Backoff { attempt, delay } => {
                write!(f, "backoff (attempt {attempt}, {}ms)", delay.as_millis())
            }
            ChannelState::Fatal => f.write_str("fatal"),
        }
    }
}

/// Point-in-time view of a channel, handed to health sinks and `statuses()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    #[serde(flatten)]
    pub state: ChannelState,
    /// Restarts inside the current tracking window
    pub restarts: u32,
    pub pid: Option<u32>,
    pub last_exit_code: Option<i32>,
    pub last_failure: Option<SystemTime>,
    pub since: SystemTime,
}

impl ChannelStatus {
    pub fn new() -> Self {
        Self {
            state: ChannelState::Starting,
            restarts: 0,
            pid: None,
            last_exit_code: None,
            last_failure: None,
            since: SystemTime::now(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.state == ChannelState::Fatal
    }
}

impl Default for ChannelStatus {
    fn default() -> Self {
        Self::new()
    }
}
