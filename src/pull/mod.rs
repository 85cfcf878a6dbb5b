//! RTSP pull path
//!
//! A single supervising loop keeps one pipeline process pulling from an
//! RTSP(S) camera and forwarding to the cloud sink:
//!
//! ```text
//! Probing ──ok──► Launching ──► Running/Monitoring ──exit──► Cleanup
//!    │                                                         │
//!    └──fail──► Backoff ◄──────────────────────────────────────┘
//!                  │
//!                  └──► Probing ...
//! ```

pub mod backoff;
pub mod launcher;
pub mod probe;
pub mod source;
pub mod supervisor;

use thiserror::Error;

pub use backoff::BackoffPolicy;
pub use launcher::{GstPullLauncher, SourceLauncher};
pub use probe::probe;
pub use source::{PullSource, Transport};
pub use supervisor::{PullConfig, PullSupervisor};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PullError {
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    #[error("source unreachable: {0}")]
    SourceUnreachable(String),

    #[error("failed to spawn pull pipeline: {0}")]
    Spawn(String),

    #[error("invalid backoff multiplier: must be > 1.0")]
    InvalidBackoffMultiplier,
}
