//! Publisher registry
//!
//! Enforces a single active publisher per stream path. A second publish on
//! an occupied path is refused and the existing session keeps running.
//!
//! ```text
//!     Arc<PublisherRegistry>
//!   ┌──────────────────────────┐
//!   │ Mutex<HashMap<           │
//!   │   StreamPath,            │◄── register(path, session)
//!   │   PublisherEntry>>       │◄── unregister(path, session)
//!   └──────────────────────────┘
//! ```

pub mod error;
pub mod path;
pub mod store;

pub use error::RegistryError;
pub use path::StreamPath;
pub use store::{PublisherEntry, PublisherRegistry};
