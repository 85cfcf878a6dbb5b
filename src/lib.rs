//! Live camera ingestion for edge deployments
//!
//! Two ingestion paths feed the same cloud video sink, an external
//! `gst-launch-1.0 ... ! kvssink` pipeline process:
//!
//! ```text
//!  camera --RTMP(S) push--> IngestServer --AccessUnit--> ForwardingSupervisor --Annex-B stdin--> kvssink
//!  camera <--RTSP(S) pull-- PullSupervisor --spawns--> rtspsrc ! rtph264depay ! ... ! kvssink
//! ```
//!
//! - [`server`]: RTMP handshake, chunk stream and publish commands; one
//!   publisher per `/app/name` path via [`registry`].
//! - [`forwarder`]: launches and supervises the sink pipeline, restarts it
//!   with a cooldown, tears it down with signal escalation.
//! - [`pull`]: probes an RTSP camera and keeps a pull pipeline running with
//!   exponential backoff.
//! - [`credentials`]: container credentials exported into every pipeline
//!   launch.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use edge_ingest::{
//!     CredentialManager, ForwardingSupervisor, GstLauncher, IngestServer, PipelineConfig,
//!     PublisherRegistry, ServerConfig, SupervisorPolicy,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let forwarder = Arc::new(ForwardingSupervisor::new(
//!     PipelineConfig::new("front-door"),
//!     SupervisorPolicy::default(),
//!     Arc::new(GstLauncher),
//!     Arc::new(CredentialManager::from_env(None)?),
//! ));
//! let server = IngestServer::new(
//!     ServerConfig::default(),
//!     Arc::new(PublisherRegistry::new()),
//!     forwarder,
//! );
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:1935").await?;
//! server.serve(listener, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod amf;
pub mod config;
pub mod credentials;
pub mod error;
pub mod forwarder;
pub mod media;
pub mod protocol;
pub mod pull;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use credentials::CredentialManager;
pub use error::{Error, Result};
pub use forwarder::{
    Forwarder, ForwarderError, ForwardingSupervisor, GstLauncher, PipelineConfig,
    PipelineLauncher, SupervisorPolicy,
};
pub use media::AccessUnit;
pub use pull::{GstPullLauncher, PullConfig, PullError, PullSource, PullSupervisor};
pub use registry::{PublisherRegistry, StreamPath};
pub use server::{IngestServer, ServerConfig};
