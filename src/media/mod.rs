//! Media payload handling
//!
//! - FLV audio/video tag headers
//! - H.264/AVC sequence headers and AVCC NAL units
//! - AAC sequence headers (for logging discarded audio)
//! - Annex-B output for the forwarding pipeline

pub mod aac;
pub mod annexb;
pub mod flv;
pub mod h264;

pub use aac::{AacPacket, AudioSpecificConfig};
pub use annexb::encode_access_unit;
pub use flv::{AudioFormat, VideoCodec, VideoFrameType, VideoTagHeader};
pub use h264::{AccessUnit, AvcConfig, H264Packet, NaluType};
