//! Listener configuration

use std::time::Duration;

use crate::protocol::constants::*;

/// Runtime options of the ingest listener
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Chunk size announced to publishers
    pub chunk_size: u32,

    /// Window acknowledgement size
    pub window_ack_size: u32,

    /// Peer bandwidth limit
    pub peer_bandwidth: u32,

    /// TLS accept plus RTMP handshake must complete within this time
    pub handshake_timeout: Duration,

    /// Read deadline, renewed before every read
    pub read_timeout: Duration,

    /// When set, only `/live/<key>` may publish
    pub expected_stream_key: Option<String>,

    /// Access units buffered between a session and the forwarder
    pub queue_capacity: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 0,
            chunk_size: OUTBOUND_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            handshake_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            expected_stream_key: None,
            queue_capacity: 100,
            tcp_nodelay: true,
        }
    }
}

impl ServerConfig {
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Empty keys are treated as unset
    pub fn expected_stream_key(mut self, key: Option<String>) -> Self {
        self.expected_stream_key = key.filter(|k| !k.is_empty());
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.max_connections, 0);
        assert_eq!(config.chunk_size, OUTBOUND_CHUNK_SIZE);
        assert_eq!(config.window_ack_size, DEFAULT_WINDOW_ACK_SIZE);
        assert_eq!(config.handshake_timeout, Duration::from_secs(30));
        assert_eq!(config.read_timeout, Duration::from_secs(30));
        assert_eq!(config.queue_capacity, 100);
        assert!(config.expected_stream_key.is_none());
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder_chunk_size_capped() {
        let config = ServerConfig::default().chunk_size(u32::MAX);
        assert_eq!(config.chunk_size, MAX_CHUNK_SIZE);
    }

    #[test]
    fn test_empty_stream_key_is_unset() {
        let config = ServerConfig::default().expected_stream_key(Some(String::new()));
        assert!(config.expected_stream_key.is_none());

        let config = ServerConfig::default().expected_stream_key(Some("abc".into()));
        assert_eq!(config.expected_stream_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_builder_chaining() {
        let config = ServerConfig::default()
            .max_connections(50)
            .handshake_timeout(Duration::from_secs(5))
            .read_timeout(Duration::from_secs(10))
            .queue_capacity(0);

        assert_eq!(config.max_connections, 50);
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
        assert_eq!(config.queue_capacity, 1);
    }
}
