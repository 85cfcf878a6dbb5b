//! Ingest listener
//!
//! Accepts TCP (optionally TLS) connections and runs each one on its own
//! task. A second task layer isolates panics so cleanup always runs.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;

use super::config::ServerConfig;
use super::connection::{Connection, Services};
use crate::error::{Error, Result};
use crate::forwarder::Forwarder;
use crate::registry::PublisherRegistry;
use crate::session::{SharedTeardown, Teardown};

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// RTMP(S) push listener
pub struct IngestServer {
    services: Services,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl IngestServer {
    pub fn new(
        config: ServerConfig,
        registry: Arc<PublisherRegistry>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            services: Services {
                config: Arc::new(config),
                registry,
                forwarder,
            },
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    pub fn registry(&self) -> &Arc<PublisherRegistry> {
        &self.services.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.services.config
    }

    /// Accept connections until the listener fails for good
    ///
    /// `tls` selects RTMPS for every connection on this listener.
    pub async fn serve(&self, listener: TcpListener, tls: Option<TlsAcceptor>) -> Result<()> {
        self.log_listening(&listener, tls.is_some());
        self.accept_loop(&listener, tls.as_ref()).await
    }

    /// Like [`IngestServer::serve`], returning once `shutdown` resolves
    pub async fn serve_until<F>(
        &self,
        listener: TcpListener,
        tls: Option<TlsAcceptor>,
        shutdown: F,
    ) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.log_listening(&listener, tls.is_some());

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener, tls.as_ref()) => result,
        }
    }

    fn log_listening(&self, listener: &TcpListener, tls: bool) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!(addr = %addr, tls = tls, "Ingest listener ready"),
            Err(e) => tracing::warn!(error = %e, "Listener has no local address"),
        }
    }

    async fn accept_loop(&self, listener: &TcpListener, tls: Option<&TlsAcceptor>) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr, tls.cloned());
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr, tls: Option<TlsAcceptor>) {
        let permit = match &self.connection_semaphore {
            Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id = session_id, peer = %peer_addr, "New connection");

        if self.services.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(session_id = session_id, error = %e, "Failed to set TCP_NODELAY");
            }
        }

        let services = self.services.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let teardown = SharedTeardown::new();

            let session = tokio::spawn(run_session(
                session_id,
                peer_addr,
                socket,
                tls,
                services.clone(),
                teardown.clone(),
            ));
            if let Err(e) = session.await {
                if e.is_panic() {
                    tracing::error!(session_id = session_id, peer = %peer_addr, "Session task panicked");
                }
            }

            release(teardown.take(), session_id, &services).await;
            tracing::debug!(session_id = session_id, "Connection closed");
        });
    }
}

async fn run_session(
    session_id: u64,
    peer_addr: SocketAddr,
    socket: TcpStream,
    tls: Option<TlsAcceptor>,
    services: Services,
    teardown: SharedTeardown,
) {
    let handshake_timeout = services.config.handshake_timeout;

    let result = match tls {
        None => {
            Connection::new(session_id, peer_addr, socket, services, teardown)
                .run()
                .await
        }
        Some(acceptor) => match timeout(handshake_timeout, acceptor.accept(socket)).await {
            Ok(Ok(stream)) => {
                Connection::new(session_id, peer_addr, stream, services, teardown)
                    .run()
                    .await
            }
            Ok(Err(e)) => Err(Error::Tls(e.to_string())),
            Err(_) => Err(Error::Timeout("TLS accept")),
        },
    };

    match result {
        Ok(()) => {}
        Err(e @ (Error::Unauthorized(_) | Error::Registry(_))) => {
            tracing::warn!(session_id = session_id, peer = %peer_addr, error = %e, "Publish refused");
        }
        Err(e) => {
            tracing::debug!(session_id = session_id, peer = %peer_addr, error = %e, "Connection error");
        }
    }
}

/// Undo what the session set up, even after a panic
///
/// The forwarder stops before the path is released so a reconnecting
/// publisher cannot have its fresh pipeline torn down.
async fn release(pending: Teardown, session_id: u64, services: &Services) {
    if pending.started_forwarder {
        if let Err(e) = services.forwarder.stop().await {
            tracing::warn!(session_id = session_id, error = %e, "Forwarder stop incomplete");
        }
    }
    if let Some(path) = pending.registered {
        services.registry.unregister(&path, session_id).await;
    }
}
