//! Forwarding pipeline supervision
//!
//! The cloud sink runs as an external pipeline process that reads a raw
//! H.264 byte stream on stdin. [`ForwardingSupervisor`] owns that process:
//! it launches it, watches for exits, restarts it on demand with a cooldown
//! and tears it down with signal escalation.

pub mod config;
pub mod launcher;
pub mod shutdown;
pub mod supervisor;

use async_trait::async_trait;
use thiserror::Error;

pub use config::{LogRouting, PipelineConfig, SupervisorPolicy};
pub use launcher::{GstLauncher, PipelineLauncher};
pub use supervisor::{ForwarderState, ForwardingSupervisor, RestartGate};

use crate::media::AccessUnit;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwarderError {
    #[error("failed to spawn pipeline: {0}")]
    Spawn(String),

    #[error("pipeline has no stdin")]
    NoStdin,

    #[error("forwarder is stopped")]
    Stopped,

    #[error("pipeline (pid {0:?}) did not confirm exit after SIGKILL")]
    ShutdownTimeout(Option<u32>),
}

/// Video sink used by publishing sessions
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Launch if not running; `Ok(true)` when this call launched it
    async fn start(&self) -> Result<bool, ForwarderError>;

    /// Hand over one access unit; never fails
    async fn write_h264(&self, au: &AccessUnit);

    /// Stop permanently until the next `start`
    async fn stop(&self) -> Result<(), ForwarderError>;
}

#[async_trait]
impl Forwarder for ForwardingSupervisor {
    async fn start(&self) -> Result<bool, ForwarderError> {
        ForwardingSupervisor::start(self).await
    }

    async fn write_h264(&self, au: &AccessUnit) {
        ForwardingSupervisor::write_h264(self, au).await
    }

    async fn stop(&self) -> Result<(), ForwarderError> {
        ForwardingSupervisor::stop(self).await
    }
}
