//! Short-lived cloud credentials for the forwarding pipeline
//!
//! Credentials are fetched from the container metadata endpoint and exported
//! into the environment of each pipeline process when it is launched. A
//! process therefore keeps the credentials it started with; rotation happens
//! at the restart cadence.

pub mod endpoint;
pub mod error;
pub mod manager;

pub use endpoint::resolve_endpoint;
pub use error::CredentialError;
pub use manager::{CredentialManager, CredentialSet};
