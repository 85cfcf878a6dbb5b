//! Publisher registry implementation

use std::collections::HashMap;
use std::time::Instant;

use tokio::sync::Mutex;

use super::error::RegistryError;
use super::path::StreamPath;

/// Active publisher on a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherEntry {
    pub session_id: u64,
    pub since: Instant,
}

/// Map of stream path to its publishing session
///
/// Every operation takes the same lock, so check-and-insert is atomic.
#[derive(Debug, Default)]
pub struct PublisherRegistry {
    publishers: Mutex<HashMap<StreamPath, PublisherEntry>>,
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` for `session_id`
    ///
    /// Fails without touching the existing entry if the path is taken.
    pub async fn register(&self, path: &StreamPath, session_id: u64) -> Result<(), RegistryError> {
        let mut publishers = self.publishers.lock().await;

        if let Some(existing) = publishers.get(path) {
            tracing::warn!(
                path = %path,
                session_id = session_id,
                active_session = existing.session_id,
                "Publish rejected, path already has a publisher"
            );
            return Err(RegistryError::PathOccupied {
                path: path.clone(),
                session_id: existing.session_id,
            });
        }

        publishers.insert(
            path.clone(),
            PublisherEntry {
                session_id,
                since: Instant::now(),
            },
        );

        tracing::info!(
            path = %path,
            session_id = session_id,
            publishers = publishers.len(),
            "Publisher registered"
        );
        Ok(())
    }

    /// Release `path` if `session_id` still owns it
    pub async fn unregister(&self, path: &StreamPath, session_id: u64) -> bool {
        let mut publishers = self.publishers.lock().await;

        match publishers.get(path) {
            Some(entry) if entry.session_id == session_id => {
                let held = entry.since.elapsed();
                publishers.remove(path);
                tracing::info!(
                    path = %path,
                    session_id = session_id,
                    held_secs = held.as_secs(),
                    "Publisher unregistered"
                );
                true
            }
            Some(entry) => {
                tracing::debug!(
                    path = %path,
                    session_id = session_id,
                    active_session = entry.session_id,
                    "Unregister ignored, path owned by another session"
                );
                false
            }
            None => false,
        }
    }

    /// Session currently publishing on `path`
    pub async fn active(&self, path: &StreamPath) -> Option<u64> {
        self.publishers
            .lock()
            .await
            .get(path)
            .map(|entry| entry.session_id)
    }

    pub async fn len(&self) -> usize {
        self.publishers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.publishers.lock().await.is_empty()
    }
}
