//! AAC audio payloads
//!
//! Audio never reaches the forwarding pipeline. The sequence header is
//! parsed only so the discarded track can be described in the logs.
//!
//! ```text
//! | SoundFormat/Rate/Size/Type (1) | AACPacketType (1) | AudioSpecificConfig or raw frame
//! ```

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// AudioSpecificConfig, leading fields only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub audio_object_type: u8,
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    /// Bit layout: objectType (5) | frequencyIndex (4) | [frequency (24)] | channels (4)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket.into());
        }

        let audio_object_type = data[0] >> 3;
        let index = ((data[0] & 0x07) << 1) | (data[1] >> 7);

        let (sampling_frequency, channel_configuration) = if index == 0x0F {
            if data.len() < 5 {
                return Err(MediaError::InvalidAacPacket.into());
            }
            // First 40 bits: frequency sits at bits 9..33, channels at 33..37
            let bits = u64::from_be_bytes([0, 0, 0, data[0], data[1], data[2], data[3], data[4]]);
            let frequency = (bits >> 7) & 0xFF_FFFF;
            let channels = ((bits >> 3) & 0x0F) as u8;
            (frequency as u32, channels)
        } else {
            let frequency = *SAMPLING_FREQUENCIES
                .get(index as usize)
                .ok_or(MediaError::InvalidAacPacket)?;
            (frequency, (data[1] >> 3) & 0x0F)
        };

        Ok(Self {
            audio_object_type,
            sampling_frequency,
            channel_configuration,
        })
    }
}

/// Parsed AAC payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AacPacket {
    SequenceHeader(AudioSpecificConfig),
    Raw(Bytes),
}

impl AacPacket {
    /// Parse the bytes following the FLV audio tag header byte
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.is_empty() {
            return Err(MediaError::InvalidAacPacket.into());
        }

        match data.get_u8() {
            0 => Ok(AacPacket::SequenceHeader(AudioSpecificConfig::parse(&data)?)),
            1 => Ok(AacPacket::Raw(data)),
            _ => Err(MediaError::InvalidAacPacket.into()),
        }
    }
}
