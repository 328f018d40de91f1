//! Supervision of transcoder pipelines.
//!
//! [`PipelineManager`] owns one supervisor task per active channel and
//! reconciles that set against the desired channel list on every `sync`.

mod backoff;
mod manager;
mod status;
mod supervisor;

pub use manager::{PipelineManager, SyncReport};
pub use status::{ChannelState, ChannelStatus};
