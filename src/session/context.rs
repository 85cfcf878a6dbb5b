//! Per-session context shared with the connection's supervising task

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::registry::StreamPath;

/// Identity of a publishing session, carried into log fields
#[derive(Debug, Clone)]
pub struct PublishContext {
    pub session_id: u64,
    pub peer_addr: SocketAddr,
    pub path: StreamPath,
}

/// What a session has to undo when it ends
///
/// Lives outside the session task so it is still readable when that task
/// panics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Teardown {
    /// Path this session holds in the registry
    pub registered: Option<StreamPath>,
    /// This session launched the forwarder
    pub started_forwarder: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SharedTeardown(Arc<Mutex<Teardown>>);

impl SharedTeardown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, f: impl FnOnce(&mut Teardown)) {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    /// Take the pending work, leaving nothing for a second caller
    pub fn take(&self) -> Teardown {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *guard)
    }
}
