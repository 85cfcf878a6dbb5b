//! Statistics for sessions, the forwarding pipeline and the pull loop

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per publishing session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Bytes read from the socket
    pub bytes_received: u64,
    pub video_frames: u64,
    pub keyframes: u64,
    /// Audio messages read and discarded
    pub audio_frames: u64,
    /// Access units dropped because the hand-off queue was full
    pub dropped_frames: u64,
    pub duration: Duration,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inbound bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_received * 8) / secs
        } else {
            0
        }
    }
}

/// Snapshot of forwarding pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    /// Access units written to the pipeline
    pub frames: u64,
    /// Annex-B bytes written
    pub bytes: u64,
    /// Access units dropped (not running, cooling down, or failed write)
    pub dropped: u64,
    pub restarts: u64,
    /// Successful process spawns, first start included
    pub launches: u64,
}

/// Live counters behind [`ForwarderStats`]
#[derive(Debug, Default)]
pub(crate) struct ForwarderCounters {
    pub frames: AtomicU64,
    pub bytes: AtomicU64,
    pub dropped: AtomicU64,
    pub restarts: AtomicU64,
    pub launches: AtomicU64,
}

impl ForwarderCounters {
    pub fn add(counter: &AtomicU64, n: u64) -> u64 {
        counter.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn snapshot(&self) -> ForwarderStats {
        ForwarderStats {
            frames: self.frames.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            launches: self.launches.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pull loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullStats {
    pub probe_failures: u64,
    pub launches: u64,
    /// Pipeline runs that have ended
    pub completed_runs: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PullCounters {
    pub probe_failures: AtomicU64,
    pub launches: AtomicU64,
    pub completed_runs: AtomicU64,
}

impl PullCounters {
    pub fn snapshot(&self) -> PullStats {
        PullStats {
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            launches: self.launches.load(Ordering::Relaxed),
            completed_runs: self.completed_runs.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_bitrate() {
        let stats = SessionStats {
            bytes_received: 1_000_000,
            duration: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(stats.bitrate(), 800_000);
    }

    #[test]
    fn test_session_bitrate_zero_duration() {
        let stats = SessionStats {
            bytes_received: 1_000_000,
            ..Default::default()
        };
        assert_eq!(stats.bitrate(), 0);
    }

    #[test]
    fn test_forwarder_counters_snapshot() {
        let counters = ForwarderCounters::default();
        assert_eq!(ForwarderCounters::add(&counters.frames, 1), 1);
        assert_eq!(ForwarderCounters::add(&counters.frames, 1), 2);
        ForwarderCounters::add(&counters.bytes, 1500);
        ForwarderCounters::add(&counters.restarts, 1);

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.frames, 2);
        assert_eq!(snapshot.bytes, 1500);
        assert_eq!(snapshot.restarts, 1);
        assert_eq!(snapshot.dropped, 0);
    }

    #[test]
    fn test_pull_counters_snapshot() {
        let counters = PullCounters::default();
        counters.probe_failures.fetch_add(3, Ordering::Relaxed);
        assert_eq!(counters.snapshot().probe_failures, 3);
        assert_eq!(counters.snapshot().launches, 0);
    }
}
