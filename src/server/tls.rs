//! RTMPS certificate loading

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::{self, pki_types::CertificateDer};
use tokio_rustls::TlsAcceptor;

use crate::error::{Error, Result};

/// Build an acceptor from PEM certificate chain and private key files
pub fn load_acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_path)?;

    let mut reader = BufReader::new(open(key_path)?);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Tls(format!("{}: {e}", key_path.display())))?
        .ok_or_else(|| Error::Tls(format!("{}: no private key found", key_path.display())))?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| Error::Tls(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(open(path)?);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Tls(format!("{}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(Error::Tls(format!("{}: no certificates found", path.display())));
    }
    Ok(certs)
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| Error::Tls(format!("{}: {e}", path.display())))
}
