//! Registry error types

use super::path::StreamPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another session already publishes on this path
    PathOccupied {
        path: StreamPath,
        session_id: u64,
    },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::PathOccupied { path, session_id } => {
                write!(f, "{} is already published by session {}", path, session_id)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
