//! Publishing session: track discovery and hand-off to the forwarder
//!
//! ```text
//!  connection task                     forwarding task
//!  ──────────────                      ───────────────
//!  Video ─► VideoForward::push ─try_send─► mpsc(100) ─► Forwarder::write_h264
//!  Audio ─► counted, dropped
//! ```
//!
//! The connection task never waits on the pipeline. When the queue is full
//! the newest access unit is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::context::{PublishContext, SharedTeardown};
use super::track::{Delivery, TrackSink, VideoForward};
use crate::error::TrackError;
use crate::forwarder::Forwarder;
use crate::media::flv::audio_format;
use crate::media::{AacPacket, AccessUnit, AudioFormat, VideoCodec, VideoTagHeader};
use crate::stats::SessionStats;

/// How long the forwarding task may keep draining after the session ends
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PublisherSession {
    ctx: PublishContext,
    forwarder: Arc<dyn Forwarder>,
    teardown: SharedTeardown,
    queue_capacity: usize,
    video: Option<TrackSink>,
    audio: Option<TrackSink>,
    forward_task: Option<JoinHandle<()>>,
    stats: SessionStats,
    started_at: Instant,
}

impl PublisherSession {
    pub fn new(
        ctx: PublishContext,
        forwarder: Arc<dyn Forwarder>,
        teardown: SharedTeardown,
        queue_capacity: usize,
    ) -> Self {
        Self {
            ctx,
            forwarder,
            teardown,
            queue_capacity: queue_capacity.max(1),
            video: None,
            audio: None,
            forward_task: None,
            stats: SessionStats::default(),
            started_at: Instant::now(),
        }
    }

    pub fn context(&self) -> &PublishContext {
        &self.ctx
    }

    pub fn video_track(&self) -> Option<&TrackSink> {
        self.video.as_ref()
    }

    pub fn audio_track(&self) -> Option<&TrackSink> {
        self.audio.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            duration: self.started_at.elapsed(),
            ..self.stats.clone()
        }
    }

    pub async fn on_video(&mut self, timestamp: u32, data: Bytes) {
        self.stats.bytes_received += data.len() as u64;
        let Some(header) = VideoTagHeader::parse(&data) else {
            return;
        };

        if self.video.is_none() {
            let sink = self.discover_video(header).await;
            self.video = Some(sink);
        }

        let Some(TrackSink::Video(track)) = self.video.as_mut() else {
            return;
        };
        if header.codec != VideoCodec::Avc || header.is_extended() {
            return;
        }

        match track.push(timestamp, data.slice(1..)) {
            Ok(Delivery::Queued { keyframe }) => {
                self.stats.video_frames += 1;
                if keyframe {
                    self.stats.keyframes += 1;
                }
            }
            Ok(Delivery::Dropped) => {
                self.stats.video_frames += 1;
                self.stats.dropped_frames += 1;
                tracing::debug!(
                    session_id = self.ctx.session_id,
                    dropped = self.stats.dropped_frames,
                    "Forwarding queue full, access unit dropped"
                );
            }
            Ok(Delivery::Closed) => {
                self.stats.dropped_frames += 1;
            }
            Ok(Delivery::Config) => {
                tracing::debug!(session_id = self.ctx.session_id, "AVC sequence header received");
            }
            Ok(Delivery::Ignored) => {}
            Err(e) => {
                tracing::debug!(
                    session_id = self.ctx.session_id,
                    error = %e,
                    "Skipping malformed video payload"
                );
            }
        }
    }

    /// First video message decides the track's sink
    async fn discover_video(&mut self, header: VideoTagHeader) -> TrackSink {
        if header.codec != VideoCodec::Avc || header.is_extended() {
            tracing::warn!(
                session_id = self.ctx.session_id,
                path = %self.ctx.path,
                codec = header.codec.name(),
                "Unsupported video codec, track ignored"
            );
            return TrackSink::Unknown(header.codec);
        }

        tracing::info!(
            session_id = self.ctx.session_id,
            path = %self.ctx.path,
            "H.264 track discovered"
        );

        match self.forwarder.start().await {
            Ok(true) => self.teardown.update(|t| t.started_forwarder = true),
            Ok(false) => {
                tracing::debug!(session_id = self.ctx.session_id, "Forwarder already running");
            }
            Err(e) => {
                // Writes retry the launch; this session still owns the stop
                tracing::warn!(
                    session_id = self.ctx.session_id,
                    error = %e,
                    "Forwarder failed to start"
                );
                self.teardown.update(|t| t.started_forwarder = true);
            }
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.forward_task = Some(tokio::spawn(forward(
            Arc::clone(&self.forwarder),
            rx,
            self.ctx.session_id,
        )));
        TrackSink::Video(VideoForward::new(tx))
    }

    pub fn on_audio(&mut self, data: Bytes) {
        let Some(format) = audio_format(&data) else {
            return;
        };

        if self.audio.is_none() {
            tracing::info!(
                session_id = self.ctx.session_id,
                path = %self.ctx.path,
                format = format.name(),
                "Audio track discarded"
            );
            self.audio = Some(TrackSink::Audio(format));
        }

        if format == AudioFormat::Aac {
            if let Ok(AacPacket::SequenceHeader(config)) = AacPacket::parse(data.slice(1..)) {
                tracing::debug!(
                    session_id = self.ctx.session_id,
                    sample_rate = config.sampling_frequency,
                    channels = config.channel_configuration,
                    "AAC sequence header"
                );
            }
        }

        self.stats.audio_frames += 1;
        self.stats.bytes_received += data.len() as u64;
    }

    /// Close the hand-off queue and let the forwarding task drain
    pub async fn finish(mut self) -> SessionStats {
        // Dropping the sender ends the forwarding loop
        self.video = None;

        if let Some(mut task) = self.forward_task.take() {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!(session_id = self.ctx.session_id, "Forwarding task did not drain, aborting");
                task.abort();
            }
        }

        let stats = self.stats();
        if stats.video_frames == 0 {
            let e = TrackError::NoVideoTrack(self.ctx.path.to_string());
            tracing::warn!(session_id = self.ctx.session_id, error = %e, "Nothing was forwarded");
        }
        tracing::info!(
            session_id = self.ctx.session_id,
            path = %self.ctx.path,
            frames = stats.video_frames,
            keyframes = stats.keyframes,
            dropped = stats.dropped_frames,
            audio_frames = stats.audio_frames,
            bitrate = stats.bitrate(),
            duration_secs = stats.duration.as_secs(),
            "Publishing session ended"
        );
        stats
    }
}

async fn forward(forwarder: Arc<dyn Forwarder>, mut queue: mpsc::Receiver<AccessUnit>, session_id: u64) {
    while let Some(au) = queue.recv().await {
        forwarder.write_h264(&au).await;
    }
    tracing::debug!(session_id = session_id, "Forwarding task finished");
}
