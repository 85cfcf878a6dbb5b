//! Pull pipeline supervising loop

use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Child;
use tokio::time::sleep;

use super::backoff::BackoffPolicy;
use super::launcher::SourceLauncher;
use super::probe::probe;
use super::source::PullSource;
use super::PullError;
use crate::credentials::CredentialManager;
use crate::forwarder::shutdown::{escalate, EscalationPlan};
use crate::forwarder::supervisor::route_output;
use crate::forwarder::{LogRouting, PipelineConfig};
use crate::stats::{PullCounters, PullStats};

/// Loop timing
#[derive(Debug, Clone, PartialEq)]
pub struct PullConfig {
    pub probe_timeout: Duration,

    /// How often a running pipeline is checked for exit
    pub poll_interval: Duration,

    pub backoff: BackoffPolicy,

    pub shutdown: EscalationPlan,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
            shutdown: EscalationPlan::default(),
        }
    }
}

impl PullConfig {
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn shutdown(mut self, plan: EscalationPlan) -> Self {
        self.shutdown = plan;
        self
    }
}

enum RunEnd {
    Exited {
        uptime: Duration,
        status: Option<ExitStatus>,
    },
    Shutdown,
}

/// Keeps one pull pipeline alive for a single camera
pub struct PullSupervisor {
    source: PullSource,
    pipeline: PipelineConfig,
    config: PullConfig,
    launcher: Arc<dyn SourceLauncher>,
    credentials: Arc<CredentialManager>,
    counters: Arc<PullCounters>,
}

impl PullSupervisor {
    pub fn new(
        source: PullSource,
        pipeline: PipelineConfig,
        config: PullConfig,
        launcher: Arc<dyn SourceLauncher>,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        Self {
            source,
            pipeline,
            config,
            launcher,
            credentials,
            counters: Arc::new(PullCounters::default()),
        }
    }

    pub fn source(&self) -> &PullSource {
        &self.source
    }

    pub fn stats(&self) -> PullStats {
        self.counters.snapshot()
    }

    /// Supervise forever
    pub async fn run(&self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Supervise until `shutdown` resolves, then tear down the running pipeline
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let backoff = &self.config.backoff;
        let mut delay = backoff.initial_delay();

        tracing::info!(
            source = %self.source,
            stream = %self.pipeline.stream_name,
            transport = %self.source.transport,
            "Pull supervisor started"
        );

        loop {
            let probed = tokio::select! {
                _ = shutdown.as_mut() => break,
                result = probe(&self.source, self.config.probe_timeout) => result,
            };

            match probed {
                Ok(()) => {
                    self.credentials.refresh().await;

                    match self.launch().await {
                        Ok(child) => match self.monitor(child, shutdown.as_mut()).await {
                            RunEnd::Shutdown => break,
                            RunEnd::Exited { uptime, status } => {
                                let runs =
                                    self.counters.completed_runs.fetch_add(1, Ordering::Relaxed) + 1;
                                tracing::warn!(
                                    source = %self.source,
                                    status = ?status,
                                    uptime_secs = uptime.as_secs(),
                                    runs = runs,
                                    "Pull pipeline exited"
                                );
                                if backoff.should_reset(uptime) {
                                    delay = backoff.initial_delay();
                                }
                            }
                        },
                        Err(e) => {
                            tracing::error!(source = %self.source, error = %e, "Pull pipeline launch failed");
                        }
                    }
                }
                Err(e) => {
                    let failures = self.counters.probe_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::warn!(
                        source = %self.source,
                        error = %e,
                        failures = failures,
                        "Source probe failed"
                    );
                }
            }

            tracing::info!(
                source = %self.source,
                delay_ms = delay.as_millis() as u64,
                "Waiting before next attempt"
            );
            tokio::select! {
                _ = shutdown.as_mut() => break,
                _ = sleep(delay) => {}
            }
            delay = backoff.next_delay(delay);
        }

        tracing::info!(source = %self.source, "Pull supervisor stopped");
    }

    async fn launch(&self) -> Result<Child, PullError> {
        let mut command = self.launcher.command(&self.source, &self.pipeline);
        command.stdin(Stdio::null()).kill_on_drop(true);
        match self.pipeline.log_routing {
            LogRouting::Stdout => {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            }
            LogRouting::Discard => {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
        }
        #[cfg(unix)]
        command.process_group(0);
        self.credentials.apply(&mut command).await;

        let mut child = command
            .spawn()
            .map_err(|e| PullError::Spawn(format!("{}: {e}", self.pipeline.program)))?;

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            route_output(stdout, pid, false);
        }
        if let Some(stderr) = child.stderr.take() {
            route_output(stderr, pid, true);
        }

        let launches = self.counters.launches.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            source = %self.source,
            stream = %self.pipeline.stream_name,
            pid = ?pid,
            launches = launches,
            "Pull pipeline started"
        );
        Ok(child)
    }

    async fn monitor<F>(&self, mut child: Child, mut shutdown: Pin<&mut F>) -> RunEnd
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();

        let status = loop {
            tokio::select! {
                _ = shutdown.as_mut() => {
                    tracing::info!(source = %self.source, pid = ?child.id(), "Stopping pull pipeline");
                    escalate(&mut child, &self.config.shutdown).await;
                    return RunEnd::Shutdown;
                }
                _ = sleep(self.config.poll_interval) => {}
            }

            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {}
                Err(e) => {
                    // Status unknown, so the process may still be alive
                    tracing::warn!(source = %self.source, error = %e, "Lost track of pull pipeline");
                    escalate(&mut child, &self.config.shutdown).await;
                    break None;
                }
            }
        };

        RunEnd::Exited {
            uptime: started.elapsed(),
            status,
        }
    }
}
