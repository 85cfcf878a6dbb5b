//! Error types
//!
//! Connection-local errors (handshake, protocol, authorization, track) never
//! leave the connection task. Forwarder and credential errors are absorbed by
//! the supervisor and show up as dropped frames and log lines.

use std::io;

use thiserror::Error;

pub use crate::credentials::CredentialError;
pub use crate::forwarder::ForwarderError;
pub use crate::pull::PullError;
pub use crate::registry::RegistryError;

/// Crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthorizationError),

    #[error("track error: {0}")]
    Track(#[from] TrackError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("forwarder error: {0}")]
    Forwarder(#[from] ForwarderError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("pull error: {0}")]
    Pull(#[from] PullError),

    #[error("timed out during {0}")]
    Timeout(&'static str),

    #[error("TLS configuration: {0}")]
    Tls(String),
}

/// RTMP handshake failures
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unsupported RTMP version {0}")]
    InvalidVersion(u8),

    #[error("peer closed the connection during handshake")]
    ConnectionClosed,
}

/// Malformed or unsupported RTMP traffic
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("message of {0} bytes exceeds the size limit")]
    MessageTooLarge(usize),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),
}

/// AMF0 decoding failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmfError {
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("unknown type marker 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    #[error("invalid object end marker")]
    InvalidObjectEnd,

    #[error("nesting too deep")]
    NestingTooDeep,
}

/// Media payload parsing failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("invalid AVC packet")]
    InvalidAvcPacket,

    #[error("invalid AAC packet")]
    InvalidAacPacket,

    #[error("empty media payload")]
    EmptyPayload,
}

/// Publish path rejected by the expected-path check
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("path {requested} does not match {expected}")]
pub struct AuthorizationError {
    pub requested: String,
    pub expected: String,
}

/// No usable video track on a publishing session
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackError {
    #[error("session on {0} ended without an H.264 track")]
    NoVideoTrack(String),
}
