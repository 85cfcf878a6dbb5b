//! RTMP messages
//!
//! [`RawMessage`] is what the chunk layer produces and consumes;
//! [`RtmpMessage`] is its typed interpretation.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, AmfValue};
use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// A reassembled message with its chunk stream id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub csid: u32,
    pub timestamp: u32,
    pub type_id: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

/// AMF command (`connect`, `publish`, ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    pub command_object: AmfValue,
    pub arguments: Vec<AmfValue>,
    pub stream_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RtmpMessage {
    SetChunkSize(u32),
    Abort(u32),
    Acknowledgement(u32),
    WindowAckSize(u32),
    SetPeerBandwidth { size: u32, limit: u8 },
    UserControl { event: u16, data: Bytes },
    Command(Command),
    /// `@setDataFrame` / `onMetaData` and friends
    Data(Vec<AmfValue>),
    Audio { timestamp: u32, data: Bytes },
    Video { timestamp: u32, data: Bytes },
    Other { type_id: u8 },
}

impl RtmpMessage {
    pub fn from_raw(raw: RawMessage) -> Result<Self> {
        let mut payload = raw.payload;

        let message = match raw.type_id {
            MSG_SET_CHUNK_SIZE => RtmpMessage::SetChunkSize(read_u32(&mut payload)? & 0x7FFF_FFFF),
            MSG_ABORT => RtmpMessage::Abort(read_u32(&mut payload)?),
            MSG_ACKNOWLEDGEMENT => RtmpMessage::Acknowledgement(read_u32(&mut payload)?),
            MSG_WINDOW_ACK_SIZE => RtmpMessage::WindowAckSize(read_u32(&mut payload)?),
            MSG_SET_PEER_BANDWIDTH => {
                let size = read_u32(&mut payload)?;
                let limit = if payload.has_remaining() { payload.get_u8() } else { BANDWIDTH_LIMIT_DYNAMIC };
                RtmpMessage::SetPeerBandwidth { size, limit }
            }
            MSG_USER_CONTROL => {
                if payload.remaining() < 2 {
                    return Err(ProtocolError::UnexpectedMessage("short user control".into()).into());
                }
                let event = payload.get_u16();
                RtmpMessage::UserControl { event, data: payload }
            }
            MSG_COMMAND_AMF0 | MSG_COMMAND_AMF3 => {
                if raw.type_id == MSG_COMMAND_AMF3 && payload.has_remaining() {
                    payload.advance(1);
                }
                RtmpMessage::Command(parse_command(payload, raw.stream_id)?)
            }
            MSG_DATA_AMF0 | MSG_DATA_AMF3 => {
                if raw.type_id == MSG_DATA_AMF3 && payload.has_remaining() {
                    payload.advance(1);
                }
                RtmpMessage::Data(amf0::decode_all(payload)?)
            }
            MSG_AUDIO => RtmpMessage::Audio { timestamp: raw.timestamp, data: payload },
            MSG_VIDEO => RtmpMessage::Video { timestamp: raw.timestamp, data: payload },
            other => RtmpMessage::Other { type_id: other },
        };

        Ok(message)
    }
}

fn read_u32(payload: &mut Bytes) -> Result<u32> {
    if payload.remaining() < 4 {
        return Err(ProtocolError::UnexpectedMessage("short control message".into()).into());
    }
    Ok(payload.get_u32())
}

fn parse_command(payload: Bytes, stream_id: u32) -> Result<Command> {
    let mut values = amf0::decode_all(payload)?.into_iter();

    let name = match values.next() {
        Some(AmfValue::String(name)) => name,
        other => {
            return Err(ProtocolError::InvalidCommand(format!("command name {other:?}")).into());
        }
    };
    let transaction_id = values.next().and_then(|v| v.as_number()).unwrap_or(0.0);
    let command_object = values.next().unwrap_or(AmfValue::Null);

    Ok(Command {
        name,
        transaction_id,
        command_object,
        arguments: values.collect(),
        stream_id,
    })
}

/// Parameters of a `connect` command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectParams {
    pub app: String,
    pub tc_url: Option<String>,
    pub flash_ver: Option<String>,
    pub object_encoding: f64,
}

impl ConnectParams {
    pub fn from_command(command: &Command) -> Result<Self> {
        let obj = &command.command_object;
        let app = obj
            .get_string("app")
            .ok_or_else(|| ProtocolError::InvalidCommand("connect without app".into()))?;

        Ok(Self {
            // Some encoders append a trailing slash or query
            app: strip_query(app).trim_matches('/').to_string(),
            tc_url: obj.get_string("tcUrl").map(str::to_string),
            flash_ver: obj.get_string("flashVer").map(str::to_string),
            object_encoding: obj.get_number("objectEncoding").unwrap_or(0.0),
        })
    }
}

/// Parameters of a `publish` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishParams {
    pub stream_name: String,
    pub publish_type: String,
}

impl PublishParams {
    pub fn from_command(command: &Command) -> Result<Self> {
        let name = command
            .arguments
            .first()
            .and_then(AmfValue::as_str)
            .ok_or_else(|| ProtocolError::InvalidCommand("publish without stream name".into()))?;

        Ok(Self {
            stream_name: strip_query(name).to_string(),
            publish_type: command
                .arguments
                .get(1)
                .and_then(AmfValue::as_str)
                .unwrap_or("live")
                .to_string(),
        })
    }
}

fn strip_query(name: &str) -> &str {
    name.split('?').next().unwrap_or(name)
}

// Outbound messages

fn control(type_id: u8, payload: Bytes) -> RawMessage {
    RawMessage {
        csid: CSID_PROTOCOL_CONTROL,
        timestamp: 0,
        type_id,
        stream_id: 0,
        payload,
    }
}

fn u32_payload(value: u32) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

pub fn set_chunk_size(size: u32) -> RawMessage {
    control(MSG_SET_CHUNK_SIZE, u32_payload(size))
}

pub fn window_ack_size(size: u32) -> RawMessage {
    control(MSG_WINDOW_ACK_SIZE, u32_payload(size))
}

pub fn acknowledgement(sequence: u32) -> RawMessage {
    control(MSG_ACKNOWLEDGEMENT, u32_payload(sequence))
}

pub fn set_peer_bandwidth(size: u32, limit: u8) -> RawMessage {
    let mut payload = BytesMut::with_capacity(5);
    payload.put_u32(size);
    payload.put_u8(limit);
    control(MSG_SET_PEER_BANDWIDTH, payload.freeze())
}

pub fn user_control(event: u16, value: u32) -> RawMessage {
    let mut payload = BytesMut::with_capacity(6);
    payload.put_u16(event);
    payload.put_u32(value);
    control(MSG_USER_CONTROL, payload.freeze())
}

pub fn stream_begin(stream_id: u32) -> RawMessage {
    user_control(UC_STREAM_BEGIN, stream_id)
}

/// Command message from name, transaction id and values
pub fn command(csid: u32, stream_id: u32, name: &str, transaction_id: f64, values: Vec<AmfValue>) -> RawMessage {
    let mut all = Vec::with_capacity(values.len() + 2);
    all.push(AmfValue::from(name));
    all.push(AmfValue::Number(transaction_id));
    all.extend(values);

    RawMessage {
        csid,
        timestamp: 0,
        type_id: MSG_COMMAND_AMF0,
        stream_id,
        payload: amf0::encode_all(&all),
    }
}

/// `_result` for `connect`
pub fn connect_result(transaction_id: f64, object_encoding: f64) -> RawMessage {
    let properties = AmfValue::object([
        ("fmsVer", AmfValue::from("FMS/3,0,1,123")),
        ("capabilities", AmfValue::Number(31.0)),
    ]);
    let information = AmfValue::object([
        ("level", AmfValue::from("status")),
        ("code", AmfValue::from(NC_CONNECT_SUCCESS)),
        ("description", AmfValue::from("Connection succeeded.")),
        ("objectEncoding", AmfValue::Number(object_encoding)),
    ]);
    command(CSID_COMMAND, 0, CMD_RESULT, transaction_id, vec![properties, information])
}

/// `_result` for `createStream`
pub fn create_stream_result(transaction_id: f64, stream_id: u32) -> RawMessage {
    command(
        CSID_COMMAND,
        0,
        CMD_RESULT,
        transaction_id,
        vec![AmfValue::Null, AmfValue::from(stream_id)],
    )
}

/// Empty `_result` for commands that only need an acknowledgement
pub fn empty_result(transaction_id: f64) -> RawMessage {
    command(
        CSID_COMMAND,
        0,
        CMD_RESULT,
        transaction_id,
        vec![AmfValue::Null, AmfValue::Undefined],
    )
}

pub fn on_fc_publish(stream_name: &str) -> RawMessage {
    let info = AmfValue::object([
        ("code", AmfValue::from(NS_PUBLISH_START)),
        ("description", AmfValue::from(stream_name)),
    ]);
    command(CSID_COMMAND, 0, CMD_ON_FC_PUBLISH, 0.0, vec![AmfValue::Null, info])
}

/// `onStatus` on the publishing stream
pub fn on_status(stream_id: u32, level: &str, code: &str, description: &str) -> RawMessage {
    let info = AmfValue::object([
        ("level", level),
        ("code", code),
        ("description", description),
    ]);
    command(CSID_STATUS, stream_id, CMD_ON_STATUS, 0.0, vec![AmfValue::Null, info])
}
