//! H.264/AVC payloads carried in FLV video tags
//!
//! ```text
//! +-----------------+------------------+------------------------+
//! | AVCPacketType   | CompositionTime  | Data                   |
//! | (1 byte)        | (SI24)           |                        |
//! +-----------------+------------------+------------------------+
//! ```
//!
//! - 0: sequence header (AVCDecoderConfigurationRecord with SPS/PPS)
//! - 1: one or more length-prefixed (AVCC) NAL units
//! - 2: end of sequence

use bytes::{Buf, Bytes};

use crate::error::{MediaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    SequenceHeader = 0,
    Nalu = 1,
    EndOfSequence = 2,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// NAL unit type (low 5 bits of the NAL header)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    Slice,
    Idr,
    Sei,
    Sps,
    Pps,
    Aud,
    Other(u8),
}

impl NaluType {
    pub fn from_byte(b: u8) -> Self {
        match b & 0x1F {
            1 => NaluType::Slice,
            5 => NaluType::Idr,
            6 => NaluType::Sei,
            7 => NaluType::Sps,
            8 => NaluType::Pps,
            9 => NaluType::Aud,
            other => NaluType::Other(other),
        }
    }

    /// Type of a NAL unit, `None` when empty
    pub fn of(nalu: &[u8]) -> Option<Self> {
        nalu.first().map(|b| Self::from_byte(*b))
    }
}

/// AVCDecoderConfigurationRecord
///
/// ```text
/// version (1) | profile (1) | compat (1) | level (1) | 0b111111 + lengthSizeMinusOne (1)
/// | 0b111 + numSPS (1) | { len (2) | sps }* | numPPS (1) | { len (2) | pps }*
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    pub profile: u8,
    pub level: u8,
    /// Bytes per NALU length prefix, usually 4
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.len() < 7 || data[0] != 1 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        data.advance(1);
        let profile = data.get_u8();
        let _compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut data, num_sps)?;

        if data.is_empty() {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let num_pps = data.get_u8() as usize;
        let pps = read_parameter_sets(&mut data, num_pps)?;

        Ok(AvcConfig {
            profile,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }

    /// SPS then PPS, in record order
    pub fn parameter_sets(&self) -> impl Iterator<Item = &Bytes> {
        self.sps.iter().chain(self.pps.iter())
    }
}

fn read_parameter_sets(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.remaining() < 2 {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let len = data.get_u16() as usize;
        if data.remaining() < len {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        sets.push(data.split_to(len));
    }
    Ok(sets)
}

/// NAL units making up one coded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// Decode timestamp in milliseconds
    pub timestamp: u32,
    pub keyframe: bool,
    pub nalus: Vec<Bytes>,
}

impl AccessUnit {
    pub fn new(timestamp: u32, nalus: Vec<Bytes>) -> Self {
        let keyframe = nalus
            .iter()
            .any(|n| NaluType::of(n) == Some(NaluType::Idr));
        Self {
            timestamp,
            keyframe,
            nalus,
        }
    }

    pub fn has_parameter_sets(&self) -> bool {
        let mut sps = false;
        let mut pps = false;
        for nalu in &self.nalus {
            match NaluType::of(nalu) {
                Some(NaluType::Sps) => sps = true,
                Some(NaluType::Pps) => pps = true,
                _ => {}
            }
        }
        sps && pps
    }

    /// Put SPS/PPS in front of a keyframe that arrived without them
    ///
    /// Leading AUD/SEI units stay first.
    pub fn inject_parameter_sets(&mut self, config: &AvcConfig) {
        if !self.keyframe || self.has_parameter_sets() {
            return;
        }

        let position = self
            .nalus
            .iter()
            .position(|n| !matches!(NaluType::of(n), Some(NaluType::Aud | NaluType::Sei)))
            .unwrap_or(self.nalus.len());

        let sets: Vec<Bytes> = config.parameter_sets().cloned().collect();
        self.nalus.splice(position..position, sets);
    }

    pub fn payload_len(&self) -> usize {
        self.nalus.iter().map(Bytes::len).sum()
    }
}

/// Parsed AVC video payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum H264Packet {
    SequenceHeader(AvcConfig),
    Frame(AccessUnit),
    EndOfSequence,
}

impl H264Packet {
    /// Parse the bytes following the FLV video tag header byte
    pub fn parse(mut data: Bytes, timestamp: u32, nalu_length_size: u8) -> Result<Self> {
        if data.len() < 4 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        let packet_type = data.get_u8();
        // Composition time offset, not needed for an elementary stream
        data.advance(3);

        match AvcPacketType::from_byte(packet_type) {
            Some(AvcPacketType::SequenceHeader) => {
                Ok(H264Packet::SequenceHeader(AvcConfig::parse(data)?))
            }
            Some(AvcPacketType::Nalu) => {
                let nalus = split_avcc(data, nalu_length_size)?;
                if nalus.is_empty() {
                    return Err(MediaError::EmptyPayload.into());
                }
                Ok(H264Packet::Frame(AccessUnit::new(timestamp, nalus)))
            }
            Some(AvcPacketType::EndOfSequence) => Ok(H264Packet::EndOfSequence),
            None => Err(MediaError::InvalidAvcPacket.into()),
        }
    }
}

/// Split length-prefixed NAL units; zero-length entries are skipped
pub fn split_avcc(mut data: Bytes, nalu_length_size: u8) -> Result<Vec<Bytes>> {
    let size = nalu_length_size as usize;
    if !(1..=4).contains(&size) {
        return Err(MediaError::InvalidAvcPacket.into());
    }

    let mut nalus = Vec::new();
    while data.has_remaining() {
        if data.remaining() < size {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let len = data.get_uint(size) as usize;
        if data.remaining() < len {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let nalu = data.split_to(len);
        if !nalu.is_empty() {
            nalus.push(nalu);
        }
    }
    Ok(nalus)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQUENCE_HEADER_RECORD: &[u8] = &[
        0x01, 0x64, 0x00, 0x1F, 0xFF, // version, High, compat, 3.1, 4-byte lengths
        0xE1, 0x00, 0x04, 0x67, 0x64, 0x00, 0x1F, // 1 SPS
        0x01, 0x00, 0x03, 0x68, 0xEF, 0x38, // 1 PPS
    ];

    fn config() -> AvcConfig {
        AvcConfig::parse(Bytes::from_static(SEQUENCE_HEADER_RECORD)).unwrap()
    }

    #[test]
    fn test_nalu_type() {
        assert_eq!(NaluType::from_byte(0x65), NaluType::Idr);
        assert_eq!(NaluType::from_byte(0x67), NaluType::Sps);
        assert_eq!(NaluType::from_byte(0x68), NaluType::Pps);
        assert_eq!(NaluType::from_byte(0x41), NaluType::Slice);
        assert_eq!(NaluType::from_byte(0x0C), NaluType::Other(12));
        assert_eq!(NaluType::of(&[]), None);
    }

    #[test]
    fn test_avc_config_parse() {
        let config = config();
        assert_eq!(config.profile, 100);
        assert_eq!(config.level, 31);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(&config.sps[0][..], &[0x67, 0x64, 0x00, 0x1F]);
        assert_eq!(&config.pps[0][..], &[0x68, 0xEF, 0x38]);
    }

    #[test]
    fn test_avc_config_rejects_bad_records() {
        assert!(AvcConfig::parse(Bytes::from_static(&[0x01, 0x64, 0x00])).is_err());

        let mut bad_version = SEQUENCE_HEADER_RECORD.to_vec();
        bad_version[0] = 2;
        assert!(AvcConfig::parse(Bytes::from(bad_version)).is_err());

        let truncated = &SEQUENCE_HEADER_RECORD[..SEQUENCE_HEADER_RECORD.len() - 2];
        assert!(AvcConfig::parse(Bytes::copy_from_slice(truncated)).is_err());
    }

    #[test]
    fn test_parse_sequence_header_packet() {
        let mut data = vec![0x00, 0x00, 0x00, 0x00];
        data.extend_from_slice(SEQUENCE_HEADER_RECORD);

        let packet = H264Packet::parse(Bytes::from(data), 0, 4).unwrap();
        assert_eq!(packet, H264Packet::SequenceHeader(config()));
    }

    #[test]
    fn test_parse_keyframe_with_several_nalus() {
        let data = Bytes::from_static(&[
            0x01, 0x00, 0x00, 0x00, // NALU, cts 0
            0x00, 0x00, 0x00, 0x02, 0x09, 0xF0, // AUD
            0x00, 0x00, 0x00, 0x03, 0x65, 0x88, 0x84, // IDR
        ]);

        let H264Packet::Frame(au) = H264Packet::parse(data, 40, 4).unwrap() else {
            panic!("expected frame");
        };
        assert!(au.keyframe);
        assert_eq!(au.timestamp, 40);
        assert_eq!(au.nalus.len(), 2);
        assert_eq!(au.payload_len(), 5);
    }

    #[test]
    fn test_parse_inter_frame() {
        let data = Bytes::from_static(&[
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x41, 0x9A,
        ]);
        let H264Packet::Frame(au) = H264Packet::parse(data, 0, 4).unwrap() else {
            panic!("expected frame");
        };
        assert!(!au.keyframe);
    }

    #[test]
    fn test_parse_rejects_truncated_nalu() {
        let data = Bytes::from_static(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0A, 0x65]);
        assert!(H264Packet::parse(data, 0, 4).is_err());
    }

    #[test]
    fn test_parse_end_of_sequence_and_bad_type() {
        let eos = Bytes::from_static(&[0x02, 0x00, 0x00, 0x00]);
        assert_eq!(H264Packet::parse(eos, 0, 4).unwrap(), H264Packet::EndOfSequence);

        let bad = Bytes::from_static(&[0x03, 0x00, 0x00, 0x00]);
        assert!(H264Packet::parse(bad, 0, 4).is_err());

        assert!(H264Packet::parse(Bytes::from_static(&[0x01]), 0, 4).is_err());
    }

    #[test]
    fn test_split_avcc_two_byte_lengths() {
        let data = Bytes::from_static(&[0x00, 0x02, 0x65, 0x88, 0x00, 0x00, 0x00, 0x01, 0x41]);
        let nalus = split_avcc(data, 2).unwrap();
        assert_eq!(nalus.len(), 2);
        assert_eq!(&nalus[1][..], &[0x41]);
    }

    #[test]
    fn test_inject_parameter_sets_after_aud() {
        let mut au = AccessUnit::new(
            0,
            vec![Bytes::from_static(&[0x09, 0xF0]), Bytes::from_static(&[0x65, 0x88])],
        );
        au.inject_parameter_sets(&config());

        let types: Vec<_> = au.nalus.iter().filter_map(|n| NaluType::of(n)).collect();
        assert_eq!(
            types,
            vec![NaluType::Aud, NaluType::Sps, NaluType::Pps, NaluType::Idr]
        );
    }

    #[test]
    fn test_inject_skips_inter_frames_and_complete_keyframes() {
        let mut inter = AccessUnit::new(0, vec![Bytes::from_static(&[0x41, 0x9A])]);
        inter.inject_parameter_sets(&config());
        assert_eq!(inter.nalus.len(), 1);

        let mut complete = AccessUnit::new(
            0,
            vec![
                Bytes::from_static(&[0x67, 0x64]),
                Bytes::from_static(&[0x68, 0xEF]),
                Bytes::from_static(&[0x65, 0x88]),
            ],
        );
        complete.inject_parameter_sets(&config());
        assert_eq!(complete.nalus.len(), 3);
    }
}
