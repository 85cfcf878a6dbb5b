use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use edge_ingest::config::{init_tracing, shutdown_signal, IngestArgs};
use edge_ingest::server::load_acceptor;
use edge_ingest::{
    ForwardingSupervisor, GstLauncher, IngestServer, PublisherRegistry, SupervisorPolicy,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = IngestArgs::parse();
    args.validate()?;

    init_tracing(args.verbose);

    let pipeline = args.pipeline.to_pipeline_config()?;
    let credentials = Arc::new(args.pipeline.credential_manager()?);

    info!("Starting RTMP ingest");
    info!("  Stream: {}", pipeline.stream_name);
    info!("  Region: {}", pipeline.region);
    info!("  RTMP listen: {}", args.bind);
    if args.tls_enabled() {
        info!("  RTMPS listen: {}", args.tls_bind);
    }
    info!(
        "  Stream key check: {}",
        if args.expected_stream_key.is_some() { "on" } else { "off" }
    );

    let forwarder = Arc::new(ForwardingSupervisor::new(
        pipeline,
        SupervisorPolicy::default(),
        Arc::new(GstLauncher),
        credentials,
    ));
    let server = IngestServer::new(
        args.to_server_config(),
        Arc::new(PublisherRegistry::new()),
        forwarder.clone(),
    );

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;

    let secure = match (&args.tls_cert, &args.tls_key) {
        (Some(cert), Some(key)) => {
            let acceptor = load_acceptor(cert, key).context("failed to load TLS_CERT/TLS_KEY")?;
            let tls_listener = TcpListener::bind(args.tls_bind)
                .await
                .with_context(|| format!("failed to bind {}", args.tls_bind))?;
            Some((tls_listener, acceptor))
        }
        _ => None,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let plain = server.serve_until(listener, None, stopped(shutdown_rx.clone()));
    let tls = async {
        match secure {
            Some((tls_listener, acceptor)) => {
                server
                    .serve_until(tls_listener, Some(acceptor), stopped(shutdown_rx.clone()))
                    .await
            }
            None => Ok(()),
        }
    };
    let (plain, tls) = tokio::join!(plain, tls);

    if let Err(e) = forwarder.stop().await {
        error!("Forwarder shutdown: {}", e);
    }

    let stats = forwarder.stats();
    info!(
        launches = stats.launches,
        frames = stats.frames,
        dropped = stats.dropped,
        "RTMP ingest stopped"
    );

    plain?;
    tls?;
    Ok(())
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
