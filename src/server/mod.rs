//! RTMP(S) push listener
//!
//! ```text
//! IngestServer::serve ──accept──► task ──► Connection::run
//!                                   │        (handshake, commands, media)
//!                                   └──► release (forwarder stop, registry)
//! ```

pub mod config;
mod connection;
pub mod listener;
pub mod tls;

pub use config::ServerConfig;
pub use listener::IngestServer;
pub use tls::load_acceptor;
