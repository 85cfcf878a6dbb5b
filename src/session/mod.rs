//! Publishing session handling
//!
//! - [`SessionState`]: protocol-level state of one connection
//! - [`PublisherSession`]: track discovery and hand-off to the forwarder
//! - [`SharedTeardown`]: cleanup record that outlives a panicking session

pub mod context;
pub mod publisher;
pub mod state;
pub mod track;

pub use context::{PublishContext, SharedTeardown, Teardown};
pub use publisher::PublisherSession;
pub use state::{SessionPhase, SessionState};
pub use track::{Delivery, TrackKind, TrackSink, VideoForward};
