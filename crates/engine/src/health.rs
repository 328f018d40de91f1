//! Health reporting hooks.
//!
//! A [`HealthSink`] is told about every state transition of every supervised
//! channel. It runs inline on the supervisor task, so implementations must not block.

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::pipeline::{ChannelState, ChannelStatus};

pub trait HealthSink: Send + Sync {
    fn on_transition(&self, slug: &str, status: &ChannelStatus);
}

impl<F> HealthSink for F
where
    F: Fn(&str, &ChannelStatus) + Send + Sync,
{
    fn on_transition(&self, slug: &str, status: &ChannelStatus) {
        self(slug, status)
    }
}

/// Logs every transition. The default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHealthSink;

impl HealthSink for TracingHealthSink {
    fn on_transition(&self, slug: &str, status: &ChannelStatus) {
        match status.state {
            ChannelState::Running => {
                info!(slug, pid = ?status.pid, restarts = status.restarts, "Channel running")
            }
            ChannelState::Backoff { attempt, delay } => warn!(
                slug,
                attempt,
                ?delay,
                exit_code = ?status.last_exit_code,
                "Channel failed, restarting after backoff"
            ),
            ChannelState::Fatal => error!(
                slug,
                restarts = status.restarts,
                exit_code = ?status.last_exit_code,
                "Channel exceeded its restart budget"
            ),
            state => debug!(slug, %state, "Channel state changed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEvent {
    pub slug: String,
    pub status: ChannelStatus,
}

/// Forwards transitions into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelHealthSink {
    tx: mpsc::UnboundedSender<HealthEvent>,
}

impl HealthSink for ChannelHealthSink {
    fn on_transition(&self, slug: &str, status: &ChannelStatus) {
        // receiver gone means nobody is listening any more
        let _ = self.tx.send(HealthEvent {
            slug: slug.to_string(),
            status: status.clone(),
        });
    }
}

pub fn health_channel() -> (ChannelHealthSink, mpsc::UnboundedReceiver<HealthEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelHealthSink { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_sink() {
        let seen = Mutex::new(Vec::new());
        let sink = |slug: &str, status: &ChannelStatus| {
            seen.lock().unwrap().push((slug.to_string(), status.state));
        };
        sink.on_transition("news", &ChannelStatus::new());
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[("news".to_string(), ChannelState::Starting)]
        );
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = health_channel();
        let mut status = ChannelStatus::new();
        status.state = ChannelState::Fatal;
        sink.on_transition("news", &status);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.slug, "news");
        assert!(event.status.is_fatal());
    }

    #[test]
    fn test_status_serializes_state_tag() {
        let mut status = ChannelStatus::new();
        status.state = ChannelState::Backoff {
            attempt: 2,
            delay: std::time::Duration::from_secs(2),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "backoff");
        assert_eq!(json["attempt"], 2);
    }
}
