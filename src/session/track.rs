//! Media tracks and their sinks

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::Result;
use crate::media::{AccessUnit, AudioFormat, AvcConfig, H264Packet, VideoCodec};

/// Codec-tagged substream discovered from its first message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video(VideoCodec),
    Audio(AudioFormat),
}

/// Destination of a track, chosen once at discovery
#[derive(Debug)]
pub enum TrackSink {
    /// H.264, forwarded to the pipeline
    Video(VideoForward),
    /// Audio of any format, read and dropped
    Audio(AudioFormat),
    /// Video in a codec the pipeline cannot take
    Unknown(VideoCodec),
}

impl TrackSink {
    pub fn kind(&self) -> TrackKind {
        match self {
            TrackSink::Video(_) => TrackKind::Video(VideoCodec::Avc),
            TrackSink::Audio(format) => TrackKind::Audio(*format),
            TrackSink::Unknown(codec) => TrackKind::Video(*codec),
        }
    }
}

/// What happened to one video payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Sequence header stored
    Config,
    Queued { keyframe: bool },
    /// Queue full, newest unit dropped
    Dropped,
    /// Forwarding task is gone
    Closed,
    /// End of sequence or nothing to forward
    Ignored,
}

/// H.264 track state: the current parameter sets and the hand-off queue
#[derive(Debug)]
pub struct VideoForward {
    config: Option<AvcConfig>,
    queue: mpsc::Sender<AccessUnit>,
}

impl VideoForward {
    pub fn new(queue: mpsc::Sender<AccessUnit>) -> Self {
        Self {
            config: None,
            queue,
        }
    }

    pub fn config(&self) -> Option<&AvcConfig> {
        self.config.as_ref()
    }

    /// Handle the AVC body that follows the video tag header byte
    ///
    /// Never waits on the queue.
    pub fn push(&mut self, timestamp: u32, body: Bytes) -> Result<Delivery> {
        let nalu_length_size = self.config.as_ref().map_or(4, |c| c.nalu_length_size);

        match H264Packet::parse(body, timestamp, nalu_length_size)? {
            H264Packet::SequenceHeader(config) => {
                if let Some(previous) = &self.config {
                    if previous != &config {
                        tracing::info!(
                            profile = config.profile,
                            level = config.level,
                            "AVC parameter sets changed"
                        );
                    }
                }
                self.config = Some(config);
                Ok(Delivery::Config)
            }
            H264Packet::Frame(mut au) => {
                if let Some(config) = &self.config {
                    au.inject_parameter_sets(config);
                }
                let keyframe = au.keyframe;
                match self.queue.try_send(au) {
                    Ok(()) => Ok(Delivery::Queued { keyframe }),
                    Err(TrySendError::Full(_)) => Ok(Delivery::Dropped),
                    Err(TrySendError::Closed(_)) => Ok(Delivery::Closed),
                }
            }
            H264Packet::EndOfSequence => Ok(Delivery::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: [u8; 4] = [0x67, 0x64, 0x00, 0x1f];
    const PPS: [u8; 4] = [0x68, 0xee, 0x3c, 0x80];

    fn sequence_header() -> Bytes {
        let mut body = vec![0x00, 0, 0, 0, 0x01, 0x64, 0x00, 0x1f, 0xff, 0xe1, 0x00, 0x04];
        body.extend_from_slice(&SPS);
        body.extend_from_slice(&[0x01, 0x00, 0x04]);
        body.extend_from_slice(&PPS);
        Bytes::from(body)
    }

    fn nalus(units: &[&[u8]]) -> Bytes {
        let mut body = vec![0x01, 0, 0, 0];
        for unit in units {
            body.extend_from_slice(&(unit.len() as u32).to_be_bytes());
            body.extend_from_slice(unit);
        }
        Bytes::from(body)
    }

    #[test]
    fn test_keyframe_gets_parameter_sets() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut track = VideoForward::new(tx);

        assert_eq!(track.push(0, sequence_header()).unwrap(), Delivery::Config);
        assert_eq!(track.config().unwrap().sps[0].as_ref(), &SPS);

        let delivery = track.push(40, nalus(&[&[0x65, 0x88, 0x84]])).unwrap();
        assert_eq!(delivery, Delivery::Queued { keyframe: true });

        let au = rx.try_recv().unwrap();
        assert_eq!(au.timestamp, 40);
        assert_eq!(au.nalus.len(), 3);
        assert_eq!(au.nalus[0].as_ref(), &SPS);
        assert_eq!(au.nalus[1].as_ref(), &PPS);
        assert_eq!(au.nalus[2].as_ref(), &[0x65, 0x88, 0x84]);
    }

    #[test]
    fn test_inter_frame_untouched() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut track = VideoForward::new(tx);
        track.push(0, sequence_header()).unwrap();

        let delivery = track.push(80, nalus(&[&[0x41, 0x9a]])).unwrap();
        assert_eq!(delivery, Delivery::Queued { keyframe: false });
        assert_eq!(rx.try_recv().unwrap().nalus.len(), 1);
    }

    #[test]
    fn test_full_queue_drops_newest() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut track = VideoForward::new(tx);

        assert!(matches!(
            track.push(0, nalus(&[&[0x41, 0x01]])).unwrap(),
            Delivery::Queued { .. }
        ));
        assert_eq!(track.push(40, nalus(&[&[0x41, 0x02]])).unwrap(), Delivery::Dropped);

        // The oldest unit is the one kept
        assert_eq!(rx.try_recv().unwrap().timestamp, 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut track = VideoForward::new(tx);
        assert_eq!(track.push(0, nalus(&[&[0x41, 0x01]])).unwrap(), Delivery::Closed);
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let (tx, _rx) = mpsc::channel(1);
        let mut track = VideoForward::new(tx);
        // Length prefix claims more than is there
        let body = Bytes::from_static(&[0x01, 0, 0, 0, 0, 0, 0, 9, 0x65]);
        assert!(track.push(0, body).is_err());
    }

    #[test]
    fn test_sink_kind() {
        assert_eq!(
            TrackSink::Audio(AudioFormat::Aac).kind(),
            TrackKind::Audio(AudioFormat::Aac)
        );
        assert_eq!(
            TrackSink::Unknown(VideoCodec::Other(12)).kind(),
            TrackKind::Video(VideoCodec::Other(12))
        );
    }
}
