//! Per-connection RTMP handling
//!
//! ```text
//! handshake (deadline) ──► connect ──► createStream ──► publish ──► media ...
//!                                                          │
//!                                        authorize path ───┤
//!                                        claim registry ───┘
//! ```
//!
//! Only the publishing side of RTMP is served. `play` closes the connection.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use super::config::ServerConfig;
use crate::amf::AmfValue;
use crate::error::{AuthorizationError, Error, HandshakeError, Result};
use crate::forwarder::Forwarder;
use crate::protocol::constants::*;
use crate::protocol::message::{self, Command, ConnectParams, PublishParams, RawMessage, RtmpMessage};
use crate::protocol::{ChunkDecoder, ChunkEncoder, Handshake};
use crate::registry::{PublisherRegistry, StreamPath};
use crate::session::{PublishContext, PublisherSession, SessionState, SharedTeardown};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Everything a connection shares with the listener
#[derive(Clone)]
pub(crate) struct Services {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<PublisherRegistry>,
    pub forwarder: Arc<dyn Forwarder>,
}

enum Flow {
    Continue,
    Close,
}

pub(crate) struct Connection<S> {
    stream: S,
    services: Services,
    teardown: SharedTeardown,
    state: SessionState,
    read_buf: BytesMut,
    write_buf: BytesMut,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    publisher: Option<PublisherSession>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        stream: S,
        services: Services,
        teardown: SharedTeardown,
    ) -> Self {
        Self {
            stream,
            services,
            teardown,
            state: SessionState::new(session_id, peer_addr),
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            write_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            publisher: None,
        }
    }

    /// Serve until the peer leaves or an error ends the session
    ///
    /// Registry and forwarder cleanup is left to the caller through the
    /// shared teardown record.
    pub async fn run(mut self) -> Result<()> {
        let result = self.serve().await;

        self.state.close();
        if let Some(publisher) = self.publisher.take() {
            publisher.finish().await;
        }
        let _ = self.stream.shutdown().await;

        tracing::debug!(
            session_id = self.state.id,
            bytes = self.state.bytes_received,
            duration_secs = self.state.duration().as_secs(),
            "Session finished"
        );
        result
    }

    async fn serve(&mut self) -> Result<()> {
        timeout(self.services.config.handshake_timeout, self.handshake())
            .await
            .map_err(|_| Error::Timeout("handshake"))??;
        self.state.complete_handshake();
        tracing::debug!(session_id = self.state.id, "Handshake complete");

        loop {
            while let Some(raw) = self.decoder.decode(&mut self.read_buf)? {
                let flow = self.handle_message(raw).await?;
                if let Flow::Close = flow {
                    self.flush().await?;
                    return Ok(());
                }
            }
            self.flush().await?;

            if self.read().await? == 0 {
                tracing::debug!(session_id = self.state.id, "Peer closed the connection");
                return Ok(());
            }
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        let mut handshake = Handshake::server();

        while !handshake.is_done() {
            let needed = handshake.bytes_needed();
            while self.read_buf.len() < needed {
                if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                    return Err(HandshakeError::ConnectionClosed.into());
                }
            }

            // Anything past the handshake stays buffered for the chunk decoder
            let mut data = self.read_buf.split_to(needed).freeze();
            if let Some(response) = handshake.process(&mut data)? {
                self.stream.write_all(&response).await?;
                self.stream.flush().await?;
            }
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<usize> {
        let n = timeout(
            self.services.config.read_timeout,
            self.stream.read_buf(&mut self.read_buf),
        )
        .await
        .map_err(|_| Error::Timeout("read"))??;

        if let Some(sequence) = self.state.add_bytes_received(n as u64) {
            self.send(message::acknowledgement(sequence));
        }
        Ok(n)
    }

    fn send(&mut self, message: RawMessage) {
        self.encoder.encode(&message, &mut self.write_buf);
    }

    async fn flush(&mut self) -> Result<()> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        self.write_buf.clear();
        Ok(())
    }

    async fn handle_message(&mut self, raw: RawMessage) -> Result<Flow> {
        let message = match RtmpMessage::from_raw(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(session_id = self.state.id, error = %e, "Skipping undecodable message");
                return Ok(Flow::Continue);
            }
        };

        match message {
            RtmpMessage::SetChunkSize(size) => {
                self.decoder.set_chunk_size(size)?;
                tracing::debug!(session_id = self.state.id, size = size, "Peer chunk size");
            }
            RtmpMessage::Abort(csid) => self.decoder.abort(csid),
            RtmpMessage::WindowAckSize(size) => self.state.window_ack_size = size,
            RtmpMessage::UserControl { event, mut data } => {
                if event == UC_PING_REQUEST && data.remaining() >= 4 {
                    let timestamp = data.get_u32();
                    self.send(message::user_control(UC_PING_RESPONSE, timestamp));
                }
            }
            RtmpMessage::Acknowledgement(_) | RtmpMessage::SetPeerBandwidth { .. } => {}
            RtmpMessage::Command(command) => return self.handle_command(command).await,
            RtmpMessage::Data(values) => {
                let name = values.iter().find_map(AmfValue::as_str).unwrap_or_default();
                tracing::debug!(session_id = self.state.id, name = name, "Data message");
            }
            RtmpMessage::Audio { data, .. } => {
                if let Some(publisher) = self.publisher.as_mut() {
                    publisher.on_audio(data);
                }
            }
            RtmpMessage::Video { timestamp, data } => {
                if let Some(publisher) = self.publisher.as_mut() {
                    publisher.on_video(timestamp, data).await;
                }
            }
            RtmpMessage::Other { type_id } => {
                tracing::trace!(session_id = self.state.id, type_id = type_id, "Ignoring message");
            }
        }

        Ok(Flow::Continue)
    }

    async fn handle_command(&mut self, command: Command) -> Result<Flow> {
        let transaction_id = command.transaction_id;

        match command.name.as_str() {
            CMD_CONNECT => self.on_connect(&command)?,
            CMD_RELEASE_STREAM => {
                if transaction_id > 0.0 {
                    self.send(message::empty_result(transaction_id));
                }
            }
            CMD_FC_PUBLISH => {
                let name = command.arguments.first().and_then(AmfValue::as_str).unwrap_or_default();
                self.send(message::on_fc_publish(name));
                if transaction_id > 0.0 {
                    self.send(message::empty_result(transaction_id));
                }
            }
            CMD_CREATE_STREAM => {
                let stream_id = self.state.allocate_stream_id();
                self.send(message::create_stream_result(transaction_id, stream_id));
            }
            CMD_PUBLISH => self.on_publish(&command).await?,
            CMD_PLAY => {
                tracing::info!(
                    session_id = self.state.id,
                    peer = %self.state.peer_addr,
                    "Play requested, only publishing is served"
                );
                return Ok(Flow::Close);
            }
            CMD_FC_UNPUBLISH => {
                let stream_id = self.publish_stream_id(command.stream_id);
                self.send(message::on_status(
                    stream_id,
                    "status",
                    NS_UNPUBLISH_SUCCESS,
                    "Stopped publishing",
                ));
            }
            CMD_DELETE_STREAM | CMD_CLOSE_STREAM => {
                tracing::info!(session_id = self.state.id, command = %command.name, "Publisher ended the stream");
                return Ok(Flow::Close);
            }
            other => {
                tracing::debug!(session_id = self.state.id, command = other, "Ignoring command");
            }
        }

        Ok(Flow::Continue)
    }

    fn on_connect(&mut self, command: &Command) -> Result<()> {
        let params = ConnectParams::from_command(command)?;
        let chunk_size = self.services.config.chunk_size;

        tracing::info!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            app = %params.app,
            tc_url = ?params.tc_url,
            flash_ver = ?params.flash_ver,
            "Connect"
        );

        self.send(message::window_ack_size(self.services.config.window_ack_size));
        self.send(message::set_peer_bandwidth(
            self.services.config.peer_bandwidth,
            BANDWIDTH_LIMIT_DYNAMIC,
        ));
        self.send(message::set_chunk_size(chunk_size));
        self.encoder.set_chunk_size(chunk_size);
        self.send(message::connect_result(command.transaction_id, params.object_encoding));

        self.state.on_connect(params);
        Ok(())
    }

    async fn on_publish(&mut self, command: &Command) -> Result<()> {
        if self.publisher.is_some() {
            tracing::warn!(session_id = self.state.id, "Second publish on one connection ignored");
            return Ok(());
        }

        let params = PublishParams::from_command(command)?;
        let stream_id = self.publish_stream_id(command.stream_id);
        let app = self.state.app().unwrap_or_default().to_string();
        let path = StreamPath::new(app, params.stream_name);

        if let Some(key) = &self.services.config.expected_stream_key {
            let expected = StreamPath::expected(key);
            if path != expected {
                self.reject(stream_id, "Stream path not authorized").await?;
                return Err(AuthorizationError {
                    requested: path.to_string(),
                    expected: expected.to_string(),
                }
                .into());
            }
        }

        if let Err(e) = self.services.registry.register(&path, self.state.id).await {
            self.reject(stream_id, "Stream path already has a publisher").await?;
            return Err(e.into());
        }
        self.teardown.update(|t| t.registered = Some(path.clone()));
        self.state.on_publish(path.clone());

        self.send(message::stream_begin(stream_id));
        self.send(message::on_status(
            stream_id,
            "status",
            NS_PUBLISH_START,
            &format!("Publishing {path}"),
        ));

        tracing::info!(
            session_id = self.state.id,
            peer = %self.state.peer_addr,
            path = %path,
            publish_type = %params.publish_type,
            "Publishing started"
        );

        let ctx = PublishContext {
            session_id: self.state.id,
            peer_addr: self.state.peer_addr,
            path,
        };
        self.publisher = Some(PublisherSession::new(
            ctx,
            Arc::clone(&self.services.forwarder),
            self.teardown.clone(),
            self.services.config.queue_capacity,
        ));
        Ok(())
    }

    /// Tell the client its publish was refused
    async fn reject(&mut self, stream_id: u32, description: &str) -> Result<()> {
        self.send(message::on_status(stream_id, "error", NS_PUBLISH_BAD_NAME, description));
        self.flush().await
    }

    fn publish_stream_id(&self, stream_id: u32) -> u32 {
        if stream_id == 0 {
            PUBLISH_STREAM_ID
        } else {
            stream_id
        }
    }
}
