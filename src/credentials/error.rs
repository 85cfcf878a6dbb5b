//! Credential fetch errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no credential endpoint configured")]
    NoEndpoint,

    #[error("invalid credential endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("credential request failed: {0}")]
    Request(String),

    #[error("credential endpoint returned status {0}")]
    Status(u16),

    #[error("malformed credential response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CredentialError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CredentialError::Decode(err.to_string())
        } else {
            CredentialError::Request(err.to_string())
        }
    }
}
