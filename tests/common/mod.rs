//! Minimal RTMP publisher and fakes shared by the integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use edge_ingest::amf::AmfValue;
use edge_ingest::forwarder::{Forwarder, ForwarderError};
use edge_ingest::media::AccessUnit;
use edge_ingest::protocol::constants::{MSG_AUDIO, MSG_VIDEO};
use edge_ingest::protocol::message::{self, Command, RawMessage, RtmpMessage};
use edge_ingest::protocol::{ChunkDecoder, ChunkEncoder, Handshake, HandshakeRole};
use edge_ingest::{IngestServer, PublisherRegistry, ServerConfig};

pub const SPS: [u8; 4] = [0x67, 0x64, 0x00, 0x1f];
pub const PPS: [u8; 4] = [0x68, 0xee, 0x3c, 0x80];
pub const IDR: [u8; 4] = [0x65, 0x88, 0x84, 0x21];
pub const INTER: [u8; 3] = [0x41, 0x9a, 0x02];
/// Raw AAC payload; must never reach the pipeline
pub const AUDIO_MARKER: [u8; 4] = [0xde, 0xad, 0xbe, 0xef];

const STEP: Duration = Duration::from_secs(5);

/// Start an ingest server on an ephemeral port
pub async fn start_server(
    config: ServerConfig,
    forwarder: Arc<dyn Forwarder>,
) -> (SocketAddr, Arc<PublisherRegistry>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let registry = Arc::new(PublisherRegistry::new());
    let server = IngestServer::new(config, Arc::clone(&registry), forwarder);

    tokio::spawn(async move {
        let _ = server.serve(listener, None).await;
    });
    (addr, registry)
}

/// Wait until no path has a publisher
pub async fn wait_until_empty(registry: &PublisherRegistry) {
    timeout(Duration::from_secs(10), async {
        while !registry.is_empty().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry never emptied");
}

/// Video tag: AVC sequence header carrying [`SPS`] and [`PPS`]
pub fn avc_sequence_header() -> Bytes {
    let mut body = vec![0x17, 0x00, 0, 0, 0, 0x01, 0x64, 0x00, 0x1f, 0xff, 0xe1, 0x00, 0x04];
    body.extend_from_slice(&SPS);
    body.extend_from_slice(&[0x01, 0x00, 0x04]);
    body.extend_from_slice(&PPS);
    Bytes::from(body)
}

/// Video tag with length-prefixed NAL units
pub fn avc_frame(keyframe: bool, units: &[&[u8]]) -> Bytes {
    let mut body = vec![if keyframe { 0x17 } else { 0x27 }, 0x01, 0, 0, 0];
    for unit in units {
        body.extend_from_slice(&(unit.len() as u32).to_be_bytes());
        body.extend_from_slice(unit);
    }
    Bytes::from(body)
}

pub fn aac_sequence_header() -> Bytes {
    Bytes::from_static(&[0xaf, 0x00, 0x12, 0x10])
}

pub fn aac_frame() -> Bytes {
    let mut body = vec![0xaf, 0x01];
    body.extend_from_slice(&AUDIO_MARKER);
    Bytes::from(body)
}

/// Client side of an RTMP publish
pub struct TestPublisher {
    stream: TcpStream,
    encoder: ChunkEncoder,
    decoder: ChunkDecoder,
    read_buf: BytesMut,
    stream_id: u32,
}

impl TestPublisher {
    pub async fn connect(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut handshake = Handshake::new(HandshakeRole::Client);

        let c0c1 = handshake.generate_initial().unwrap();
        stream.write_all(&c0c1).await.unwrap();

        let mut s0s1s2 = vec![0u8; handshake.bytes_needed()];
        timeout(STEP, stream.read_exact(&mut s0s1s2))
            .await
            .expect("handshake reply timed out")
            .unwrap();
        let c2 = handshake
            .process(&mut Bytes::from(s0s1s2))
            .unwrap()
            .unwrap();
        stream.write_all(&c2).await.unwrap();
        assert!(handshake.is_done());

        Self {
            stream,
            encoder: ChunkEncoder::new(),
            decoder: ChunkDecoder::new(),
            read_buf: BytesMut::new(),
            stream_id: 0,
        }
    }

    pub async fn send(&mut self, message: RawMessage) {
        let mut out = BytesMut::new();
        self.encoder.encode(&message, &mut out);
        self.stream.write_all(&out).await.unwrap();
    }

    /// Next message from the server; `None` once it hung up
    pub async fn next_message(&mut self) -> Option<RtmpMessage> {
        loop {
            if let Some(raw) = self.decoder.decode(&mut self.read_buf).unwrap() {
                let message = RtmpMessage::from_raw(raw).unwrap();
                if let RtmpMessage::SetChunkSize(size) = message {
                    self.decoder.set_chunk_size(size).unwrap();
                }
                return Some(message);
            }

            let n = timeout(STEP, self.stream.read_buf(&mut self.read_buf))
                .await
                .expect("server went quiet")
                .ok()?;
            if n == 0 {
                return None;
            }
        }
    }

    /// Skip ahead to the named command
    pub async fn expect_command(&mut self, name: &str) -> Command {
        loop {
            match self.next_message().await {
                Some(RtmpMessage::Command(command)) if command.name == name => return command,
                Some(_) => continue,
                None => panic!("connection closed while waiting for {name}"),
            }
        }
    }

    /// True once the server closes the connection
    pub async fn is_closed(&mut self) -> bool {
        loop {
            match self.next_message().await {
                Some(_) => continue,
                None => return true,
            }
        }
    }

    /// Run the OBS-style publish sequence, returning the `onStatus` code
    pub async fn publish(&mut self, app: &str, name: &str) -> String {
        let connect = AmfValue::object([
            ("app", app.to_string()),
            ("tcUrl", format!("rtmp://127.0.0.1/{app}")),
            ("flashVer", "FMLE/3.0".to_string()),
            ("type", "nonprivate".to_string()),
        ]);
        self.send(message::command(3, 0, "connect", 1.0, vec![connect])).await;
        let result = self.expect_command("_result").await;
        assert_eq!(result.transaction_id, 1.0);

        self.send(message::command(3, 0, "releaseStream", 2.0, vec![AmfValue::Null, name.into()]))
            .await;
        self.send(message::command(3, 0, "FCPublish", 3.0, vec![AmfValue::Null, name.into()]))
            .await;
        self.send(message::command(3, 0, "createStream", 4.0, vec![AmfValue::Null])).await;

        let created = loop {
            let result = self.expect_command("_result").await;
            if result.transaction_id == 4.0 {
                break result;
            }
        };
        self.stream_id = created
            .arguments
            .first()
            .and_then(AmfValue::as_number)
            .expect("createStream result without stream id") as u32;

        self.send(message::command(
            8,
            self.stream_id,
            "publish",
            5.0,
            vec![AmfValue::Null, name.into(), "live".into()],
        ))
        .await;

        let status = self.expect_command("onStatus").await;
        status
            .arguments
            .first()
            .and_then(|info| info.get_string("code"))
            .unwrap_or_default()
            .to_string()
    }

    pub async fn send_video(&mut self, timestamp: u32, body: Bytes) {
        self.send(RawMessage {
            csid: 6,
            timestamp,
            type_id: MSG_VIDEO,
            stream_id: self.stream_id,
            payload: body,
        })
        .await;
    }

    pub async fn send_audio(&mut self, timestamp: u32, body: Bytes) {
        self.send(RawMessage {
            csid: 4,
            timestamp,
            type_id: MSG_AUDIO,
            stream_id: self.stream_id,
            payload: body,
        })
        .await;
    }

    /// FCUnpublish + deleteStream, then wait for the server to hang up
    pub async fn unpublish(mut self, name: &str) {
        self.send(message::command(3, 0, "FCUnpublish", 6.0, vec![AmfValue::Null, name.into()]))
            .await;
        self.send(message::command(
            3,
            0,
            "deleteStream",
            7.0,
            vec![AmfValue::Null, AmfValue::Number(f64::from(self.stream_id))],
        ))
        .await;
        assert!(self.is_closed().await);
    }

    /// Close the socket without unpublishing
    pub async fn hang_up(mut self) {
        self.stream.shutdown().await.unwrap();
        assert!(self.is_closed().await);
    }
}

/// Forwarder that records what it was asked to do
#[derive(Default)]
pub struct RecordingForwarder {
    pub starts: AtomicU64,
    pub stops: AtomicU64,
    pub units: Mutex<Vec<AccessUnit>>,
}

impl RecordingForwarder {
    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn units(&self) -> Vec<AccessUnit> {
        self.units.lock().unwrap().clone()
    }
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn start(&self) -> Result<bool, ForwarderError> {
        Ok(self.starts.fetch_add(1, Ordering::SeqCst) == 0)
    }

    async fn write_h264(&self, au: &AccessUnit) {
        self.units.lock().unwrap().push(au.clone());
    }

    async fn stop(&self) -> Result<(), ForwarderError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
