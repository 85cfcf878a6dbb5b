//! Session state machine
//!
//! Tracks an RTMP connection from handshake to close.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::protocol::constants::{DEFAULT_WINDOW_ACK_SIZE, PUBLISH_STREAM_ID};
use crate::protocol::message::ConnectParams;
use crate::registry::StreamPath;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Handshaking,
    /// Handshake complete, waiting for connect
    WaitingConnect,
    /// `connect` accepted
    Connected,
    /// `publish` authorized and registered
    Publishing,
    Closing,
}

/// Protocol-level state of one connection
#[derive(Debug)]
pub struct SessionState {
    pub id: u64,

    pub peer_addr: SocketAddr,

    pub phase: SessionPhase,

    pub connected_at: Instant,

    pub handshake_completed_at: Option<Instant>,

    pub connect_params: Option<ConnectParams>,

    /// Set once publishing starts
    pub path: Option<StreamPath>,

    next_stream_id: u32,

    /// Window at which we acknowledge received bytes
    pub window_ack_size: u32,

    pub bytes_received: u64,

    last_ack: u64,
}

impl SessionState {
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            phase: SessionPhase::Handshaking,
            connected_at: Instant::now(),
            handshake_completed_at: None,
            connect_params: None,
            path: None,
            // Stream 0 is the NetConnection
            next_stream_id: PUBLISH_STREAM_ID,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            bytes_received: 0,
            last_ack: 0,
        }
    }

    pub fn complete_handshake(&mut self) {
        if self.phase == SessionPhase::Handshaking {
            self.phase = SessionPhase::WaitingConnect;
            self.handshake_completed_at = Some(Instant::now());
        }
    }

    pub fn on_connect(&mut self, params: ConnectParams) {
        self.connect_params = Some(params);
        self.phase = SessionPhase::Connected;
    }

    pub fn on_publish(&mut self, path: StreamPath) {
        self.path = Some(path);
        self.phase = SessionPhase::Publishing;
    }

    pub fn allocate_stream_id(&mut self) -> u32 {
        let id = self.next_stream_id;
        self.next_stream_id += 1;
        id
    }

    /// Count received bytes; returns the sequence number to acknowledge, if due
    pub fn add_bytes_received(&mut self, bytes: u64) -> Option<u32> {
        self.bytes_received += bytes;

        if self.window_ack_size == 0 {
            return None;
        }
        if self.bytes_received - self.last_ack >= u64::from(self.window_ack_size) {
            self.last_ack = self.bytes_received;
            // Sequence numbers wrap at 32 bits
            return Some(self.bytes_received as u32);
        }
        None
    }

    pub fn app(&self) -> Option<&str> {
        self.connect_params.as_ref().map(|p| p.app.as_str())
    }

    pub fn is_publishing(&self) -> bool {
        self.phase == SessionPhase::Publishing
    }

    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    pub fn close(&mut self) {
        self.phase = SessionPhase::Closing;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn state() -> SessionState {
        SessionState::new(1, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1935))
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = state();
        assert_eq!(state.phase, SessionPhase::Handshaking);

        state.complete_handshake();
        assert_eq!(state.phase, SessionPhase::WaitingConnect);
        assert!(state.handshake_completed_at.is_some());

        state.on_connect(ConnectParams {
            app: "live".into(),
            ..Default::default()
        });
        assert_eq!(state.phase, SessionPhase::Connected);
        assert_eq!(state.app(), Some("live"));

        state.on_publish(StreamPath::new("live", "abc"));
        assert!(state.is_publishing());
    }

    #[test]
    fn test_stream_allocation() {
        let mut state = state();
        assert_eq!(state.allocate_stream_id(), 1);
        assert_eq!(state.allocate_stream_id(), 2);
    }

    #[test]
    fn test_acknowledgement_window() {
        let mut state = state();
        state.window_ack_size = 1000;

        assert_eq!(state.add_bytes_received(600), None);
        assert_eq!(state.add_bytes_received(600), Some(1200));
        assert_eq!(state.add_bytes_received(500), None);
        assert_eq!(state.add_bytes_received(500), Some(2200));
    }
}
