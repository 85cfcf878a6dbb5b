//! Reachability probe run before every launch

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::source::PullSource;
use super::PullError;

/// TCP connect, plus an `OPTIONS` round trip for plain RTSP
///
/// Any `RTSP/1.0` status line counts as reachable, including 401.
pub async fn probe(source: &PullSource, wait: Duration) -> Result<(), PullError> {
    let addr = format!("{}:{}", source.host(), source.port());

    match timeout(wait, probe_inner(source, &addr)).await {
        Ok(result) => result,
        Err(_) => Err(PullError::SourceUnreachable(format!(
            "{addr}: no answer within {}s",
            wait.as_secs_f32()
        ))),
    }
}

async fn probe_inner(source: &PullSource, addr: &str) -> Result<(), PullError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PullError::SourceUnreachable(format!("{addr}: {e}")))?;

    if source.is_tls() {
        return Ok(());
    }

    let request = format!(
        "OPTIONS {} RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: edge-ingest\r\n\r\n",
        source.redacted()
    );
    stream
        .write_all(request.as_bytes())
        .await
        .map_err(|e| PullError::SourceUnreachable(format!("{addr}: {e}")))?;

    let mut status = String::new();
    BufReader::new(stream)
        .read_line(&mut status)
        .await
        .map_err(|e| PullError::SourceUnreachable(format!("{addr}: {e}")))?;

    if status.starts_with("RTSP/1.0") {
        Ok(())
    } else {
        Err(PullError::SourceUnreachable(format!(
            "{addr}: unexpected reply {:?}",
            status.trim_end()
        )))
    }
}
