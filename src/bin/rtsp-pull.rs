use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use edge_ingest::config::{init_tracing, shutdown_signal, PullArgs};
use edge_ingest::{GstPullLauncher, PullSupervisor};

#[tokio::main]
async fn main() -> Result<()> {
    let args = PullArgs::parse();
    args.validate()?;

    init_tracing(args.verbose);

    let source = args.to_source()?;
    let config = args.to_pull_config()?;
    let pipeline = args.pipeline.to_pipeline_config()?;
    let credentials = Arc::new(args.pipeline.credential_manager()?);

    info!("Starting RTSP pull");
    info!("  Source: {}", source);
    info!("  Transport: {}", source.transport);
    info!("  Stream: {}", pipeline.stream_name);
    info!("  Region: {}", pipeline.region);
    info!(
        "  Backoff: {:?} -> {:?} (x{})",
        config.backoff.initial_delay(),
        config.backoff.max_delay(),
        config.backoff.multiplier()
    );

    let supervisor = PullSupervisor::new(
        source,
        pipeline,
        config,
        Arc::new(GstPullLauncher),
        credentials,
    );
    supervisor.run_until(shutdown_signal()).await;

    let stats = supervisor.stats();
    info!(
        launches = stats.launches,
        completed_runs = stats.completed_runs,
        probe_failures = stats.probe_failures,
        "RTSP pull stopped"
    );
    Ok(())
}
