//! RTMP chunk stream codec
//!
//! ```text
//! +-------------+----------------+-------------------+--------------+
//! | Basic hdr   | Message header | Extended tstamp   | Chunk data   |
//! | 1-3 bytes   | 0/3/7/11 bytes | 0/4 bytes         | <= chunk sz  |
//! +-------------+----------------+-------------------+--------------+
//! ```
//!
//! The decoder never consumes a partial chunk: it parses against a view of
//! the buffer and only advances once the whole chunk is present.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::{
    DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP, MAX_CHUNK_SIZE, MAX_MESSAGE_SIZE,
};
use crate::protocol::message::RawMessage;

/// Per chunk stream header state
#[derive(Debug, Default)]
struct ChunkStream {
    timestamp: u32,
    delta: u32,
    length: u32,
    type_id: u8,
    stream_id: u32,
    extended: bool,
    /// Whether a full header has been seen on this csid
    initialized: bool,
    payload: BytesMut,
}

enum Step {
    NeedMore,
    Partial,
    Complete(RawMessage),
}

/// Reassembles messages from inbound chunks
#[derive(Debug)]
pub struct ChunkDecoder {
    chunk_size: usize,
    streams: HashMap<u32, ChunkStream>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
            streams: HashMap::new(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Apply a peer SetChunkSize
    pub fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        if size == 0 || size > MAX_CHUNK_SIZE {
            return Err(ProtocolError::InvalidChunk(format!("chunk size {size}")).into());
        }
        self.chunk_size = size as usize;
        Ok(())
    }

    /// Drop the partially received message on `csid`
    pub fn abort(&mut self, csid: u32) {
        if let Some(stream) = self.streams.get_mut(&csid) {
            stream.payload.clear();
        }
    }

    /// Decode the next complete message, consuming as many chunks as needed
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<RawMessage>> {
        loop {
            match self.read_chunk(buf)? {
                Step::NeedMore => return Ok(None),
                Step::Partial => continue,
                Step::Complete(message) => return Ok(Some(message)),
            }
        }
    }

    fn read_chunk(&mut self, buf: &mut BytesMut) -> Result<Step> {
        let mut view: &[u8] = &buf[..];
        if view.is_empty() {
            return Ok(Step::NeedMore);
        }

        let first = view.get_u8();
        let fmt = first >> 6;
        let csid = match first & 0x3F {
            0 => {
                if view.remaining() < 1 {
                    return Ok(Step::NeedMore);
                }
                64 + u32::from(view.get_u8())
            }
            1 => {
                if view.remaining() < 2 {
                    return Ok(Step::NeedMore);
                }
                let low = u32::from(view.get_u8());
                let high = u32::from(view.get_u8());
                64 + low + high * 256
            }
            id => u32::from(id),
        };

        let header_len = match fmt {
            0 => 11,
            1 => 7,
            2 => 3,
            _ => 0,
        };
        if view.remaining() < header_len {
            return Ok(Step::NeedMore);
        }

        let stream = self.streams.entry(csid).or_default();
        if fmt != 0 && !stream.initialized {
            return Err(ProtocolError::InvalidChunk(format!(
                "fmt {fmt} on csid {csid} without a prior full header"
            ))
            .into());
        }

        let mut timestamp_field = 0;
        let mut length = stream.length;
        let mut type_id = stream.type_id;
        let mut stream_id = stream.stream_id;
        if fmt <= 2 {
            timestamp_field = read_u24(&mut view);
        }
        if fmt <= 1 {
            length = read_u24(&mut view);
            type_id = view.get_u8();
        }
        if fmt == 0 {
            stream_id = view.get_u32_le();
        }

        let extended = if fmt <= 2 {
            timestamp_field >= EXTENDED_TIMESTAMP
        } else {
            stream.extended
        };
        if extended {
            if view.remaining() < 4 {
                return Ok(Step::NeedMore);
            }
            timestamp_field = view.get_u32();
        }

        if length as usize > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length as usize).into());
        }

        let starting = stream.payload.is_empty();
        let already = if starting { 0 } else { stream.payload.len() };
        let take = (length as usize).saturating_sub(already).min(self.chunk_size);
        if view.remaining() < take {
            return Ok(Step::NeedMore);
        }

        // Whole chunk present: commit header state and consume
        let header_bytes = buf.len() - view.remaining();
        match fmt {
            0 => {
                stream.timestamp = timestamp_field;
                stream.delta = 0;
            }
            1 | 2 => {
                stream.delta = timestamp_field;
                stream.timestamp = stream.timestamp.wrapping_add(timestamp_field);
            }
            _ => {
                if starting {
                    stream.timestamp = stream.timestamp.wrapping_add(stream.delta);
                }
            }
        }
        stream.length = length;
        stream.type_id = type_id;
        stream.stream_id = stream_id;
        stream.extended = extended;
        stream.initialized = true;

        buf.advance(header_bytes);
        stream.payload.extend_from_slice(&buf.split_to(take));

        if stream.payload.len() < length as usize {
            return Ok(Step::Partial);
        }

        Ok(Step::Complete(RawMessage {
            csid,
            timestamp: stream.timestamp,
            type_id: stream.type_id,
            stream_id: stream.stream_id,
            payload: stream.payload.split().freeze(),
        }))
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u24(view: &mut &[u8]) -> u32 {
    let b = [view.get_u8(), view.get_u8(), view.get_u8()];
    u32::from_be_bytes([0, b[0], b[1], b[2]])
}

/// Splits outbound messages into chunks
///
/// Every message starts with a type 0 header and continues with type 3.
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: usize,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE as usize,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Use after our own SetChunkSize has been queued
    pub fn set_chunk_size(&mut self, size: u32) {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE) as usize;
    }

    pub fn encode(&self, message: &RawMessage, out: &mut BytesMut) {
        let extended = message.timestamp >= EXTENDED_TIMESTAMP;
        let mut payload: Bytes = message.payload.clone();

        write_basic_header(out, 0, message.csid);
        out.put_uint(
            u64::from(message.timestamp.min(EXTENDED_TIMESTAMP)),
            3,
        );
        out.put_uint(payload.len() as u64, 3);
        out.put_u8(message.type_id);
        out.put_u32_le(message.stream_id);
        if extended {
            out.put_u32(message.timestamp);
        }

        let first = payload.len().min(self.chunk_size);
        out.put_slice(&payload.split_to(first));

        while !payload.is_empty() {
            write_basic_header(out, 3, message.csid);
            if extended {
                out.put_u32(message.timestamp);
            }
            let n = payload.len().min(self.chunk_size);
            out.put_slice(&payload.split_to(n));
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

fn write_basic_header(out: &mut BytesMut, fmt: u8, csid: u32) {
    match csid {
        2..=63 => out.put_u8((fmt << 6) | csid as u8),
        64..=319 => {
            out.put_u8(fmt << 6);
            out.put_u8((csid - 64) as u8);
        }
        _ => {
            let id = csid.saturating_sub(64).min(0xFFFF);
            out.put_u8((fmt << 6) | 1);
            out.put_u8((id & 0xFF) as u8);
            out.put_u8((id >> 8) as u8);
        }
    }
}
