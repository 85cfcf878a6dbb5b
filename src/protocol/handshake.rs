//! Simple RTMP handshake
//!
//! ```text
//! Client                                   Server
//!   |------- C0 + C1 ---------------------->|
//!   |<------ S0 + S1 + S2 ------------------|
//!   |------- C2 --------------------------->|
//! ```
//!
//! No HMAC digest. Peer echoes are consumed without verification since
//! cameras in the field routinely get them wrong.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRole {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Client has not sent C0C1 yet
    Initial,
    /// Server waits for C0C1, client waits for S0S1S2
    AwaitPeer,
    /// Server waits for C2
    AwaitEcho,
    Done,
}

/// Handshake state machine for either side of the connection
#[derive(Debug)]
pub struct Handshake {
    role: HandshakeRole,
    phase: Phase,
}

impl Handshake {
    pub fn new(role: HandshakeRole) -> Self {
        let phase = match role {
            HandshakeRole::Client => Phase::Initial,
            HandshakeRole::Server => Phase::AwaitPeer,
        };
        Self { role, phase }
    }

    /// Server side, already waiting for C0C1
    pub fn server() -> Self {
        Self::new(HandshakeRole::Server)
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Bytes the next call to [`Handshake::process`] needs
    pub fn bytes_needed(&self) -> usize {
        match (self.phase, self.role) {
            (Phase::AwaitPeer, HandshakeRole::Server) => 1 + HANDSHAKE_SIZE,
            (Phase::AwaitPeer, HandshakeRole::Client) => 1 + HANDSHAKE_SIZE * 2,
            (Phase::AwaitEcho, _) => HANDSHAKE_SIZE,
            _ => 0,
        }
    }

    /// C0C1 for a client; `None` for a server or when already sent
    pub fn generate_initial(&mut self) -> Option<Bytes> {
        if self.role != HandshakeRole::Client || self.phase != Phase::Initial {
            return None;
        }

        let mut buf = BytesMut::with_capacity(1 + HANDSHAKE_SIZE);
        buf.put_u8(RTMP_VERSION);
        buf.put_slice(&generate_packet());
        self.phase = Phase::AwaitPeer;
        Some(buf.freeze())
    }

    /// Feed peer bytes, returning what to send back
    ///
    /// Returns `Ok(None)` when more data is needed or nothing has to be sent.
    pub fn process(&mut self, data: &mut Bytes) -> Result<Option<Bytes>> {
        if data.remaining() < self.bytes_needed() {
            return Ok(None);
        }

        match (self.phase, self.role) {
            (Phase::AwaitPeer, HandshakeRole::Server) => {
                check_version(data.get_u8())?;
                let c1 = take_packet(data);

                let mut response = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);
                response.put_u8(RTMP_VERSION);
                response.put_slice(&generate_packet());
                response.put_slice(&generate_echo(&c1));

                self.phase = Phase::AwaitEcho;
                Ok(Some(response.freeze()))
            }
            (Phase::AwaitPeer, HandshakeRole::Client) => {
                check_version(data.get_u8())?;
                let s1 = take_packet(data);
                let _s2 = take_packet(data);

                self.phase = Phase::Done;
                Ok(Some(Bytes::copy_from_slice(&generate_echo(&s1))))
            }
            (Phase::AwaitEcho, _) => {
                let _c2 = take_packet(data);
                self.phase = Phase::Done;
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}

/// Anything from version 3 up is accepted; some encoders send odd values
fn check_version(version: u8) -> Result<()> {
    if version < RTMP_VERSION {
        return Err(HandshakeError::InvalidVersion(version).into());
    }
    Ok(())
}

fn take_packet(data: &mut Bytes) -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    data.copy_to_slice(&mut packet);
    packet
}

fn now_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// C1/S1: time (4) + zero (4) + filler (1528)
fn generate_packet() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    let timestamp = now_millis();
    packet[0..4].copy_from_slice(&timestamp.to_be_bytes());

    // LCG filler, not security relevant
    let mut seed = u64::from(timestamp) | 1;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }

    packet
}

/// C2/S2: peer's packet with bytes 4..8 set to our read time
fn generate_echo(peer: &[u8; HANDSHAKE_SIZE]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = *peer;
    echo[4..8].copy_from_slice(&now_millis().to_be_bytes());
    echo
}
