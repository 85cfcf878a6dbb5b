//! Command-line and environment configuration for the binaries

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};

use crate::credentials::CredentialManager;
use crate::forwarder::{LogRouting, PipelineConfig};
use crate::pull::{BackoffPolicy, PullConfig, PullSource, Transport};
use crate::server::ServerConfig;

/// Cloud sink pipeline parameters shared by both binaries
#[derive(Args, Debug, Clone)]
pub struct PipelineArgs {
    /// Sink stream identifier
    #[arg(long, env = "STREAM_NAME")]
    pub stream_name: Option<String>,

    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    #[arg(long, env = "RETENTION_HOURS", default_value = "24")]
    pub retention_hours: u32,

    #[arg(long, env = "FRAGMENT_DURATION_MS", default_value = "2000")]
    pub fragment_duration_ms: u32,

    /// Sink buffer in MiB
    #[arg(long, env = "BUFFER_SIZE_MB", default_value = "512")]
    pub buffer_size_mb: u32,

    /// Pipeline output: stdout or discard
    #[arg(long, env = "LOG_ROUTING", default_value = "stdout")]
    pub log_routing: LogRouting,

    #[arg(long, env = "PIPELINE_PROGRAM", default_value = "gst-launch-1.0")]
    pub pipeline_program: String,

    /// Container credential endpoint; falls back to AWS_CONTAINER_CREDENTIALS_*
    #[arg(long, env = "CREDENTIALS_URL")]
    pub credentials_url: Option<String>,
}

impl PipelineArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.stream_name()?;

        if self.region.trim().is_empty() {
            anyhow::bail!("AWS_REGION cannot be empty");
        }
        if self.fragment_duration_ms == 0 {
            anyhow::bail!("FRAGMENT_DURATION_MS cannot be 0");
        }
        if self.buffer_size_mb == 0 {
            anyhow::bail!("BUFFER_SIZE_MB cannot be 0");
        }
        Ok(())
    }

    fn stream_name(&self) -> anyhow::Result<&str> {
        match self.stream_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => anyhow::bail!("STREAM_NAME is required (set --stream-name or the STREAM_NAME environment variable)"),
        }
    }

    pub fn to_pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        Ok(PipelineConfig::new(self.stream_name()?)
            .region(self.region.clone())
            .retention_hours(self.retention_hours)
            .fragment_duration_ms(self.fragment_duration_ms)
            .buffer_size_mb(self.buffer_size_mb)
            .log_routing(self.log_routing)
            .program(self.pipeline_program.clone()))
    }

    pub fn credential_manager(&self) -> anyhow::Result<CredentialManager> {
        CredentialManager::from_env(self.credentials_url.as_deref())
            .map_err(|e| anyhow::anyhow!("CREDENTIALS_URL: {e}"))
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rtmp-ingest",
    version,
    about = "RTMP(S) push listener forwarding H.264 to the cloud video sink"
)]
pub struct IngestArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:1935")]
    pub bind: SocketAddr,

    /// Only `/live/<key>` may publish when set
    #[arg(long, env = "EXPECTED_STREAM_KEY")]
    pub expected_stream_key: Option<String>,

    /// PEM certificate chain; enables the RTMPS listener together with --tls-key
    #[arg(long, env = "TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    #[arg(long, env = "TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    #[arg(long, env = "TLS_BIND", default_value = "0.0.0.0:1936")]
    pub tls_bind: SocketAddr,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl IngestArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline.validate()?;

        match (&self.tls_cert, &self.tls_key) {
            (Some(_), None) => anyhow::bail!("TLS_KEY is required when TLS_CERT is set"),
            (None, Some(_)) => anyhow::bail!("TLS_CERT is required when TLS_KEY is set"),
            _ => {}
        }
        if self.tls_enabled() && self.tls_bind == self.bind {
            anyhow::bail!("TLS_BIND ({}) must differ from BIND_ADDR", self.tls_bind);
        }
        Ok(())
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }

    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig::default().expected_stream_key(self.expected_stream_key.clone())
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rtsp-pull",
    version,
    about = "RTSP(S) pull supervisor forwarding H.264 to the cloud video sink"
)]
pub struct PullArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Camera URL, rtsp:// or rtsps://
    #[arg(long, env = "RTSP_URL")]
    pub rtsp_url: Option<String>,

    /// tcp or udp
    #[arg(long, env = "RTSP_TRANSPORT", default_value = "tcp")]
    pub rtsp_transport: Transport,

    #[arg(long, env = "RTSP_RETRY", default_value = "3")]
    pub rtsp_retry: u32,

    #[arg(long, env = "RTSP_TIMEOUT_SECS", default_value = "10")]
    pub rtsp_timeout_secs: u64,

    #[arg(long, env = "PROBE_TIMEOUT_SECS", default_value = "10")]
    pub probe_timeout_secs: u64,

    /// How often the running pipeline is checked
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "5")]
    pub poll_interval_secs: u64,

    /// Initial reconnection delay in seconds
    #[arg(long, env = "RECONNECT_INITIAL_DELAY", default_value = "1")]
    pub reconnect_initial_delay: u64,

    /// Maximum reconnection delay in seconds
    #[arg(long, env = "RECONNECT_MAX_DELAY", default_value = "30")]
    pub reconnect_max_delay: u64,

    /// Reconnection backoff multiplier
    #[arg(long, env = "RECONNECT_MULTIPLIER", default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl PullArgs {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.pipeline.validate()?;
        self.to_source()?;

        if self.reconnect_multiplier <= 1.0 {
            anyhow::bail!("RECONNECT_MULTIPLIER must be > 1.0");
        }
        if self.reconnect_initial_delay == 0 {
            anyhow::bail!("RECONNECT_INITIAL_DELAY cannot be 0");
        }
        if self.reconnect_max_delay < self.reconnect_initial_delay {
            anyhow::bail!(
                "RECONNECT_MAX_DELAY ({}) cannot be less than RECONNECT_INITIAL_DELAY ({})",
                self.reconnect_max_delay,
                self.reconnect_initial_delay
            );
        }
        if self.poll_interval_secs == 0 {
            anyhow::bail!("POLL_INTERVAL_SECS cannot be 0");
        }
        if self.probe_timeout_secs == 0 {
            anyhow::bail!("PROBE_TIMEOUT_SECS cannot be 0");
        }
        Ok(())
    }

    pub fn to_source(&self) -> anyhow::Result<PullSource> {
        let url = match self.rtsp_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => anyhow::bail!("RTSP_URL is required (set --rtsp-url or the RTSP_URL environment variable)"),
        };

        let source = PullSource::parse(url).map_err(|e| anyhow::anyhow!("RTSP_URL: {e}"))?;
        Ok(source
            .transport(self.rtsp_transport)
            .retry(self.rtsp_retry)
            .timeout(Duration::from_secs(self.rtsp_timeout_secs)))
    }

    pub fn to_pull_config(&self) -> anyhow::Result<PullConfig> {
        let backoff = BackoffPolicy::new(
            Duration::from_secs(self.reconnect_initial_delay),
            Duration::from_secs(self.reconnect_max_delay),
            self.reconnect_multiplier,
        )
        .map_err(|e| anyhow::anyhow!("{e}"))?;

        Ok(PullConfig::default()
            .probe_timeout(Duration::from_secs(self.probe_timeout_secs))
            .poll_interval(Duration::from_secs(self.poll_interval_secs))
            .backoff(backoff))
    }
}

/// Install the `fmt` subscriber; `RUST_LOG` wins over `verbose`
pub fn init_tracing(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest(args: &[&str]) -> IngestArgs {
        IngestArgs::try_parse_from(std::iter::once("rtmp-ingest").chain(args.iter().copied())).unwrap()
    }

    fn pull(args: &[&str]) -> PullArgs {
        PullArgs::try_parse_from(std::iter::once("rtsp-pull").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_pipeline_defaults() {
        let args = ingest(&["--stream-name", "cam-1"]);
        args.validate().unwrap();

        let config = args.pipeline.to_pipeline_config().unwrap();
        assert_eq!(config.stream_name, "cam-1");
        assert_eq!(config.retention_hours, 24);
        assert_eq!(config.fragment_duration_ms, 2000);
        assert_eq!(config.buffer_size_mb, 512);
        assert_eq!(args.bind.port(), 1935);
        assert_eq!(args.tls_bind.port(), 1936);
        assert!(!args.tls_enabled());
    }

    #[test]
    fn test_missing_stream_name_names_the_key() {
        let args = ingest(&["--stream-name", "  "]);
        let err = args.validate().unwrap_err();
        assert!(err.to_string().contains("STREAM_NAME"));
    }

    #[test]
    fn test_tls_needs_both_files() {
        let args = ingest(&["--stream-name", "cam-1", "--tls-cert", "/tmp/cert.pem"]);
        let err = args.validate().unwrap_err();
        assert!(err.to_string().contains("TLS_KEY"));
    }

    #[test]
    fn test_expected_stream_key_reaches_server_config() {
        let args = ingest(&["--stream-name", "cam-1", "--expected-stream-key", "abc"]);
        let config = args.to_server_config();
        assert_eq!(config.expected_stream_key.as_deref(), Some("abc"));
    }

    #[test]
    fn test_log_routing_flag() {
        let args = ingest(&["--stream-name", "cam-1", "--log-routing", "discard"]);
        assert_eq!(args.pipeline.log_routing, LogRouting::Discard);
        assert!(IngestArgs::try_parse_from(["rtmp-ingest", "--log-routing", "file"]).is_err());
    }

    #[test]
    fn test_pull_source_settings() {
        let args = pull(&[
            "--stream-name",
            "cam-2",
            "--rtsp-url",
            "rtsps://cam.local/ch1",
            "--rtsp-transport",
            "udp",
            "--rtsp-retry",
            "7",
        ]);
        args.validate().unwrap();

        let source = args.to_source().unwrap();
        assert!(source.is_tls());
        assert_eq!(source.transport, Transport::Udp);
        assert_eq!(source.retry, 7);
        assert_eq!(source.timeout, Duration::from_secs(10));

        let config = args.to_pull_config().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.backoff, BackoffPolicy::default());
    }

    #[test]
    fn test_missing_rtsp_url_names_the_key() {
        let args = pull(&["--stream-name", "cam-2"]);
        let err = args.validate().unwrap_err();
        assert!(err.to_string().contains("RTSP_URL"));
    }

    #[test]
    fn test_invalid_backoff_rejected() {
        let args = pull(&[
            "--stream-name",
            "cam-2",
            "--rtsp-url",
            "rtsp://cam.local/ch1",
            "--reconnect-multiplier",
            "1.0",
        ]);
        let err = args.validate().unwrap_err();
        assert!(err.to_string().contains("RECONNECT_MULTIPLIER"));
    }
}
