//! Annex-B byte stream output
//!
//! The forwarding pipeline reads a raw H.264 elementary stream: every NAL
//! unit preceded by a 4-byte start code, access units back to back.

use bytes::{BufMut, Bytes, BytesMut};

use super::h264::AccessUnit;

pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Encode one access unit, NAL units in their original order
pub fn encode_access_unit(au: &AccessUnit) -> Bytes {
    let mut out = BytesMut::with_capacity(au.payload_len() + au.nalus.len() * START_CODE.len());
    for nalu in &au.nalus {
        out.put_slice(&START_CODE);
        out.put_slice(nalu);
    }
    out.freeze()
}
