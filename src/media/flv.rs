//! FLV audio/video tag headers
//!
//! RTMP audio and video messages carry FLV tag bodies. Only the first byte
//! is interpreted here.
//!
//! ```text
//! Video: | FrameType (4 bits) | CodecID (4 bits) | codec data ...
//! Audio: | SoundFormat (4) | Rate (2) | Size (1) | Type (1) | audio data ...
//! ```

use bytes::Bytes;

/// Video frame type (upper 4 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    Keyframe,
    InterFrame,
    DisposableInterFrame,
    GeneratedKeyframe,
    /// Video info/command frame, carries no picture
    InfoFrame,
    Reserved(u8),
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Self {
        match b >> 4 {
            1 => VideoFrameType::Keyframe,
            2 => VideoFrameType::InterFrame,
            3 => VideoFrameType::DisposableInterFrame,
            4 => VideoFrameType::GeneratedKeyframe,
            5 => VideoFrameType::InfoFrame,
            other => VideoFrameType::Reserved(other),
        }
    }
}

/// Video codec id (lower 4 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    SorensonH263,
    ScreenVideo,
    Vp6,
    Vp6Alpha,
    ScreenVideoV2,
    Avc,
    Other(u8),
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Self {
        match b & 0x0F {
            2 => VideoCodec::SorensonH263,
            3 => VideoCodec::ScreenVideo,
            4 => VideoCodec::Vp6,
            5 => VideoCodec::Vp6Alpha,
            6 => VideoCodec::ScreenVideoV2,
            7 => VideoCodec::Avc,
            other => VideoCodec::Other(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::SorensonH263 => "H.263",
            VideoCodec::ScreenVideo | VideoCodec::ScreenVideoV2 => "ScreenVideo",
            VideoCodec::Vp6 | VideoCodec::Vp6Alpha => "VP6",
            VideoCodec::Avc => "H.264",
            VideoCodec::Other(_) => "unknown",
        }
    }
}

/// Sound format (upper 4 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    LinearPcm,
    Adpcm,
    Mp3,
    Nellymoser,
    G711,
    Aac,
    Speex,
    Other(u8),
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Self {
        match b >> 4 {
            0 | 3 => AudioFormat::LinearPcm,
            1 => AudioFormat::Adpcm,
            2 | 14 => AudioFormat::Mp3,
            4..=6 => AudioFormat::Nellymoser,
            7 | 8 => AudioFormat::G711,
            10 => AudioFormat::Aac,
            11 => AudioFormat::Speex,
            other => AudioFormat::Other(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioFormat::LinearPcm => "PCM",
            AudioFormat::Adpcm => "ADPCM",
            AudioFormat::Mp3 => "MP3",
            AudioFormat::Nellymoser => "Nellymoser",
            AudioFormat::G711 => "G.711",
            AudioFormat::Aac => "AAC",
            AudioFormat::Speex => "Speex",
            AudioFormat::Other(_) => "unknown",
        }
    }
}

/// First byte of a video tag body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTagHeader {
    pub frame_type: VideoFrameType,
    pub codec: VideoCodec,
}

impl VideoTagHeader {
    /// `None` for an empty payload
    pub fn parse(data: &Bytes) -> Option<Self> {
        data.first().map(|b| Self {
            frame_type: VideoFrameType::from_byte(*b),
            codec: VideoCodec::from_byte(*b),
        })
    }

    /// Extended (enhanced RTMP) headers set the top bit of the frame type
    pub fn is_extended(&self) -> bool {
        matches!(self.frame_type, VideoFrameType::Reserved(t) if t & 0x08 != 0)
    }
}

/// Sound format of an audio tag body, `None` for an empty payload
pub fn audio_format(data: &Bytes) -> Option<AudioFormat> {
    data.first().map(|b| AudioFormat::from_byte(*b))
}
