//! RTMP protocol constants

/// Handshake version byte (C0/S0)
pub const RTMP_VERSION: u8 = 3;

/// Size of C1/S1/C2/S2
pub const HANDSHAKE_SIZE: usize = 1536;

/// Chunk size both sides assume until SetChunkSize
pub const DEFAULT_CHUNK_SIZE: u32 = 128;

/// Chunk size we announce to publishers
pub const OUTBOUND_CHUNK_SIZE: u32 = 4096;

/// Largest chunk size accepted from a peer (31 bits)
pub const MAX_CHUNK_SIZE: u32 = 0x7FFF_FFFF;

/// Largest reassembled message we buffer
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;
pub const DEFAULT_PEER_BANDWIDTH: u32 = 2_500_000;

/// Timestamp value signalling a 4-byte extended timestamp
pub const EXTENDED_TIMESTAMP: u32 = 0xFF_FFFF;

// Message type ids
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGEMENT: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF3: u8 = 15;
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types
pub const UC_STREAM_BEGIN: u16 = 0;
pub const UC_PING_REQUEST: u16 = 6;
pub const UC_PING_RESPONSE: u16 = 7;

// Chunk stream ids used for outbound messages
pub const CSID_PROTOCOL_CONTROL: u32 = 2;
pub const CSID_COMMAND: u32 = 3;
pub const CSID_STATUS: u32 = 5;

/// Peer bandwidth limit type: dynamic
pub const BANDWIDTH_LIMIT_DYNAMIC: u8 = 2;

/// Message stream id handed out by createStream
pub const PUBLISH_STREAM_ID: u32 = 1;

// Commands
pub const CMD_CONNECT: &str = "connect";
pub const CMD_RELEASE_STREAM: &str = "releaseStream";
pub const CMD_FC_PUBLISH: &str = "FCPublish";
pub const CMD_CREATE_STREAM: &str = "createStream";
pub const CMD_PUBLISH: &str = "publish";
pub const CMD_PLAY: &str = "play";
pub const CMD_DELETE_STREAM: &str = "deleteStream";
pub const CMD_FC_UNPUBLISH: &str = "FCUnpublish";
pub const CMD_CLOSE_STREAM: &str = "closeStream";
pub const CMD_RESULT: &str = "_result";
pub const CMD_ON_STATUS: &str = "onStatus";
pub const CMD_ON_FC_PUBLISH: &str = "onFCPublish";

// NetStream status codes
pub const NS_PUBLISH_START: &str = "NetStream.Publish.Start";
pub const NS_PUBLISH_BAD_NAME: &str = "NetStream.Publish.BadName";
pub const NS_UNPUBLISH_SUCCESS: &str = "NetStream.Unpublish.Success";
pub const NC_CONNECT_SUCCESS: &str = "NetConnection.Connect.Success";
