//! Forwarding process supervisor
//!
//! ```text
//!   Idle ──start──► Starting ──spawned──► Running ──exit──► Crashed
//!                      ▲                                       │
//!                      └──────── write_h264 (rate limited) ────┘
//!
//!   stop() from any state ──► Stopped (until the next start)
//! ```
//!
//! One exit watcher task per process owns the `Child`. It reports back
//! through the supervisor lock and a watch channel. Writes clone the stdin
//! handle under the lock and write outside it, so a slow pipe never holds
//! up `stop()`.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{watch, Mutex};

use super::config::{LogRouting, PipelineConfig, SupervisorPolicy};
use super::launcher::PipelineLauncher;
use super::shutdown::{escalate, EscalationPlan, Shutdown, WatchedProcess};
use super::ForwarderError;
use crate::credentials::CredentialManager;
use crate::media::{encode_access_unit, AccessUnit};
use crate::stats::{ForwarderCounters, ForwarderStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderState {
    Idle,
    Starting,
    Running,
    Crashed,
    /// Stopped on request; no automatic restarts
    Stopped,
}

impl fmt::Display for ForwarderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForwarderState::Idle => "idle",
            ForwarderState::Starting => "starting",
            ForwarderState::Running => "running",
            ForwarderState::Crashed => "crashed",
            ForwarderState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Admits at most one restart attempt per cooldown window
#[derive(Debug, Clone)]
pub struct RestartGate {
    cooldown: Duration,
    last_attempt: Option<Instant>,
}

impl RestartGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_attempt: None,
        }
    }

    /// Record an attempt at `now` unless the previous one is too recent
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }
        self.last_attempt = Some(now);
        true
    }

    pub fn last_attempt(&self) -> Option<Instant> {
        self.last_attempt
    }
}

struct Inner {
    state: ForwarderState,
    /// Bumped per launch so a stale watcher cannot clear a newer process
    generation: u64,
    pid: Option<u32>,
    stdin: Option<Arc<Mutex<ChildStdin>>>,
    exited: Option<watch::Receiver<bool>>,
    gate: RestartGate,
    last_report: Instant,
    /// Set once the first write after a stop has been reported
    stopped_drop_logged: bool,
}

/// Runs the cloud sink pipeline and feeds it Annex-B H.264
pub struct ForwardingSupervisor {
    config: PipelineConfig,
    policy: SupervisorPolicy,
    launcher: Arc<dyn PipelineLauncher>,
    credentials: Arc<CredentialManager>,
    inner: Arc<Mutex<Inner>>,
    counters: Arc<ForwarderCounters>,
}

impl ForwardingSupervisor {
    pub fn new(
        config: PipelineConfig,
        policy: SupervisorPolicy,
        launcher: Arc<dyn PipelineLauncher>,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        let inner = Inner {
            state: ForwarderState::Idle,
            generation: 0,
            pid: None,
            stdin: None,
            exited: None,
            gate: RestartGate::new(policy.restart_cooldown),
            last_report: Instant::now(),
            stopped_drop_logged: false,
        };

        Self {
            config,
            policy,
            launcher,
            credentials,
            inner: Arc::new(Mutex::new(inner)),
            counters: Arc::new(ForwarderCounters::default()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Launch the pipeline unless it is already running
    ///
    /// Clears a previous `stop()`. Returns `Ok(false)` if a process was
    /// already running.
    pub async fn start(&self) -> Result<bool, ForwarderError> {
        let mut inner = self.inner.lock().await;
        if inner.state == ForwarderState::Running {
            return Ok(false);
        }

        inner.state = ForwarderState::Starting;
        self.credentials.refresh().await;
        self.launch(&mut inner).await?;
        Ok(true)
    }

    /// Relaunch after a crash, at most once per cooldown
    ///
    /// Returns `Ok(false)` when running already or still cooling down.
    pub async fn restart(&self) -> Result<bool, ForwarderError> {
        let mut inner = self.inner.lock().await;
        self.restart_locked(&mut inner).await
    }

    async fn restart_locked(&self, inner: &mut Inner) -> Result<bool, ForwarderError> {
        match inner.state {
            ForwarderState::Stopped => return Err(ForwarderError::Stopped),
            ForwarderState::Running => return Ok(false),
            _ => {}
        }

        if !inner.gate.try_acquire(Instant::now()) {
            tracing::debug!(
                stream = %self.config.stream_name,
                "Restart suppressed, cooldown active"
            );
            return Ok(false);
        }

        let restarts = ForwarderCounters::add(&self.counters.restarts, 1);
        tracing::warn!(
            stream = %self.config.stream_name,
            restarts = restarts,
            "Restarting forwarding pipeline"
        );

        inner.state = ForwarderState::Starting;
        self.credentials.force_refresh().await;
        self.launch(inner).await?;
        Ok(true)
    }

    async fn launch(&self, inner: &mut Inner) -> Result<(), ForwarderError> {
        let mut command = self.launcher.command(&self.config);
        command.stdin(Stdio::piped());
        match self.config.log_routing {
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

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                inner.state = ForwarderState::Crashed;
                tracing::error!(
                    stream = %self.config.stream_name,
                    program = %self.config.program,
                    error = %e,
                    "Failed to spawn forwarding pipeline"
                );
                return Err(ForwarderError::Spawn(e.to_string()));
            }
        };

        let Some(stdin) = child.stdin.take() else {
            inner.state = ForwarderState::Crashed;
            let _ = child.start_kill();
            return Err(ForwarderError::NoStdin);
        };

        let pid = child.id();
        if let Some(stdout) = child.stdout.take() {
            route_output(stdout, pid, false);
        }
        if let Some(stderr) = child.stderr.take() {
            route_output(stderr, pid, true);
        }

        inner.generation += 1;
        let (exited_tx, exited_rx) = watch::channel(false);
        inner.pid = pid;
        inner.stdin = Some(Arc::new(Mutex::new(stdin)));
        inner.exited = Some(exited_rx);
        inner.state = ForwarderState::Running;

        let launches = ForwarderCounters::add(&self.counters.launches, 1);
        tracing::info!(
            stream = %self.config.stream_name,
            pid = ?pid,
            launches = launches,
            "Forwarding pipeline started"
        );

        tokio::spawn(watch_exit(
            Arc::clone(&self.inner),
            inner.generation,
            child,
            exited_tx,
            self.config.stream_name.clone(),
        ));
        Ok(())
    }

    /// Write one access unit as Annex-B
    ///
    /// Never fails. When the pipeline is down this makes one rate-limited
    /// restart attempt and otherwise drops the unit. After `stop()` every
    /// unit is dropped until the next `start()`; the first drop is logged.
    pub async fn write_h264(&self, au: &AccessUnit) {
        let stdin = {
            let mut inner = self.inner.lock().await;

            match inner.state {
                ForwarderState::Stopped => {
                    ForwarderCounters::add(&self.counters.dropped, 1);
                    if !inner.stopped_drop_logged {
                        inner.stopped_drop_logged = true;
                        tracing::warn!(
                            stream = %self.config.stream_name,
                            "Forwarder is stopped, dropping video until the next start"
                        );
                    }
                    return;
                }
                ForwarderState::Running => {}
                _ => {
                    if let Err(e) = self.restart_locked(&mut inner).await {
                        tracing::debug!(error = %e, "Restart attempt failed");
                    }
                }
            }

            self.maybe_report(&mut inner);

            let stdin = match (inner.state, inner.stdin.as_ref()) {
                (ForwarderState::Running, Some(stdin)) => Arc::clone(stdin),
                _ => {
                    ForwarderCounters::add(&self.counters.dropped, 1);
                    return;
                }
            };
            stdin
        };

        let data = encode_access_unit(au);
        let mut stdin = stdin.lock().await;
        if let Err(e) = stdin.write_all(&data).await {
            // The exit watcher marks the crash
            ForwarderCounters::add(&self.counters.dropped, 1);
            tracing::debug!(error = %e, "Pipeline write failed");
            return;
        }

        ForwarderCounters::add(&self.counters.frames, 1);
        ForwarderCounters::add(&self.counters.bytes, data.len() as u64);
    }

    fn maybe_report(&self, inner: &mut Inner) {
        if inner.last_report.elapsed() < self.policy.report_interval {
            return;
        }
        inner.last_report = Instant::now();

        let stats = self.counters.snapshot();
        tracing::info!(
            stream = %self.config.stream_name,
            state = %inner.state,
            frames = stats.frames,
            bytes = stats.bytes,
            dropped = stats.dropped,
            restarts = stats.restarts,
            "Forwarding throughput"
        );
    }

    /// Stop permanently and tear the process down
    ///
    /// The stop is recorded before anything else so a racing write cannot
    /// relaunch the pipeline.
    pub async fn stop(&self) -> Result<(), ForwarderError> {
        let (pid, exited, previous) = {
            let mut inner = self.inner.lock().await;
            let previous = inner.state;
            inner.state = ForwarderState::Stopped;
            inner.stopped_drop_logged = false;
            inner.stdin = None;
            (inner.pid.take(), inner.exited.take(), previous)
        };

        let Some(exited) = exited else {
            tracing::debug!(stream = %self.config.stream_name, "Stop with no pipeline process");
            return Ok(());
        };

        tracing::info!(
            stream = %self.config.stream_name,
            pid = ?pid,
            previous = %previous,
            "Stopping forwarding pipeline"
        );

        let mut process = WatchedProcess::new(pid, exited);
        match escalate(&mut process, &self.escalation_plan()).await {
            Shutdown::Unconfirmed => Err(ForwarderError::ShutdownTimeout(pid)),
            _ => Ok(()),
        }
    }

    fn escalation_plan(&self) -> EscalationPlan {
        EscalationPlan {
            interrupt: self.policy.interrupt_wait,
            terminate: self.policy.terminate_wait,
            kill: self.policy.kill_wait,
        }
    }

    pub async fn state(&self) -> ForwarderState {
        self.inner.lock().await.state
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == ForwarderState::Running
    }

    pub async fn pid(&self) -> Option<u32> {
        self.inner.lock().await.pid
    }

    pub fn stats(&self) -> ForwarderStats {
        self.counters.snapshot()
    }
}

impl fmt::Debug for ForwardingSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardingSupervisor")
            .field("config", &self.config)
            .field("stats", &self.counters.snapshot())
            .finish()
    }
}

async fn watch_exit(
    inner: Arc<Mutex<Inner>>,
    generation: u64,
    mut child: Child,
    exited: watch::Sender<bool>,
    stream: String,
) {
    let status = child.wait().await;

    {
        let mut inner = inner.lock().await;
        if inner.generation == generation {
            inner.stdin = None;
            inner.pid = None;
            inner.exited = None;
            if inner.state == ForwarderState::Stopped {
                tracing::info!(stream = %stream, status = ?status, "Forwarding pipeline exited");
            } else {
                inner.state = ForwarderState::Crashed;
                tracing::warn!(stream = %stream, status = ?status, "Forwarding pipeline exited unexpectedly");
            }
        }
    }

    exited.send_replace(true);
}

pub(crate) fn route_output<R>(reader: R, pid: Option<u32>, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                tracing::warn!(target: "edge_ingest::pipeline", pid = ?pid, "{}", line);
            } else {
                tracing::info!(target: "edge_ingest::pipeline", pid = ?pid, "{}", line);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_gate_cooldown() {
        let mut gate = RestartGate::new(Duration::from_secs(5));
        let t0 = Instant::now();

        let admitted: Vec<u64> = [0, 1, 2, 6]
            .into_iter()
            .filter(|s| gate.try_acquire(t0 + Duration::from_secs(*s)))
            .collect();

        assert_eq!(admitted, vec![0, 6]);
        assert_eq!(gate.last_attempt(), Some(t0 + Duration::from_secs(6)));
    }

    #[test]
    fn test_restart_gate_first_attempt_always_admitted() {
        let mut gate = RestartGate::new(Duration::from_secs(3600));
        assert!(gate.try_acquire(Instant::now()));
    }

    fn missing_program_supervisor(cooldown: Duration) -> ForwardingSupervisor {
        let config = PipelineConfig::new("test").program("/nonexistent/pipeline-binary");
        ForwardingSupervisor::new(
            config,
            SupervisorPolicy::default().restart_cooldown(cooldown),
            Arc::new(super::super::launcher::GstLauncher),
            Arc::new(CredentialManager::disabled().unwrap()),
        )
    }

    fn idr() -> AccessUnit {
        AccessUnit::new(0, vec![bytes::Bytes::from_static(&[0x65, 0x88, 0x84])])
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported() {
        let supervisor = missing_program_supervisor(Duration::from_secs(60));

        let result = supervisor.start().await;
        assert!(matches!(result, Err(ForwarderError::Spawn(_))));
        assert_eq!(supervisor.state().await, ForwarderState::Crashed);
        assert_eq!(supervisor.stats().launches, 0);
    }

    #[tokio::test]
    async fn test_write_during_cooldown_drops() {
        let supervisor = missing_program_supervisor(Duration::from_secs(60));
        let _ = supervisor.start().await;

        // First write gets the one restart attempt
        supervisor.write_h264(&idr()).await;
        assert_eq!(supervisor.stats().restarts, 1);

        // Cooling down: dropped without another attempt
        supervisor.write_h264(&idr()).await;
        supervisor.write_h264(&idr()).await;

        let stats = supervisor.stats();
        assert_eq!(stats.restarts, 1);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.frames, 0);
    }

    #[tokio::test]
    async fn test_restart_refused_after_stop() {
        let supervisor = missing_program_supervisor(Duration::ZERO);
        supervisor.stop().await.unwrap();

        assert!(matches!(supervisor.restart().await, Err(ForwarderError::Stopped)));
        supervisor.write_h264(&idr()).await;
        assert_eq!(supervisor.stats().restarts, 0);
        assert_eq!(supervisor.state().await, ForwarderState::Stopped);
    }

    #[cfg(unix)]
    mod process {
        use std::path::{Path, PathBuf};

        use tokio::process::Command;

        use super::*;

        fn capture_launcher(path: PathBuf) -> Arc<dyn PipelineLauncher> {
            Arc::new(move |_: &PipelineConfig| {
                let mut command = Command::new("sh");
                command.arg("-c").arg("exec cat > \"$0\"").arg(&path);
                command
            })
        }

        fn supervisor(path: PathBuf, cooldown: Duration) -> ForwardingSupervisor {
            ForwardingSupervisor::new(
                PipelineConfig::new("test").log_routing(LogRouting::Discard),
                SupervisorPolicy::default()
                    .restart_cooldown(cooldown)
                    .shutdown_waits(Duration::from_secs(2)),
                capture_launcher(path),
                Arc::new(CredentialManager::disabled().unwrap()),
            )
        }

        async fn wait_for_len(path: &Path, len: u64) {
            for _ in 0..200 {
                if std::fs::metadata(path).map(|m| m.len()).unwrap_or(0) >= len {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("{} never reached {} bytes", path.display(), len);
        }

        async fn wait_for_state(supervisor: &ForwardingSupervisor, state: ForwarderState) {
            for _ in 0..200 {
                if supervisor.state().await == state {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("supervisor never reached {state}");
        }

        #[tokio::test]
        async fn test_start_twice_launches_once() {
            let dir = tempfile::tempdir().unwrap();
            let supervisor = supervisor(dir.path().join("out.h264"), Duration::from_secs(5));

            assert!(supervisor.start().await.unwrap());
            assert!(!supervisor.start().await.unwrap());
            assert_eq!(supervisor.stats().launches, 1);
            assert!(supervisor.pid().await.is_some());

            supervisor.stop().await.unwrap();
            assert_eq!(supervisor.state().await, ForwarderState::Stopped);
        }

        #[tokio::test]
        async fn test_writes_annex_b() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out.h264");
            let supervisor = supervisor(path.clone(), Duration::from_secs(5));
            supervisor.start().await.unwrap();

            supervisor.write_h264(&idr()).await;
            wait_for_len(&path, 7).await;
            supervisor.stop().await.unwrap();

            let written = std::fs::read(&path).unwrap();
            assert_eq!(written, vec![0, 0, 0, 1, 0x65, 0x88, 0x84]);
            assert_eq!(supervisor.stats().frames, 1);
            assert_eq!(supervisor.stats().bytes, 7);
        }

        #[tokio::test]
        async fn test_no_launch_after_stop() {
            let dir = tempfile::tempdir().unwrap();
            let supervisor = supervisor(dir.path().join("out.h264"), Duration::ZERO);

            supervisor.start().await.unwrap();
            supervisor.stop().await.unwrap();
            supervisor.write_h264(&idr()).await;

            let stats = supervisor.stats();
            assert_eq!(stats.launches, 1);
            assert_eq!(stats.restarts, 0);
            assert_eq!(stats.dropped, 1);

            // A fresh start lifts the stop
            assert!(supervisor.start().await.unwrap());
            assert_eq!(supervisor.stats().launches, 2);
            supervisor.stop().await.unwrap();
        }

        #[tokio::test]
        async fn test_writes_after_stop_are_dropped_and_reported_once() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out.h264");
            let supervisor = supervisor(path.clone(), Duration::ZERO);

            // Second publisher shares the already running pipeline
            assert!(supervisor.start().await.unwrap());
            assert!(!supervisor.start().await.unwrap());
            supervisor.stop().await.unwrap();
            assert!(!supervisor.inner.lock().await.stopped_drop_logged);

            for _ in 0..20 {
                supervisor.write_h264(&idr()).await;
            }

            let stats = supervisor.stats();
            assert_eq!(stats.launches, 1);
            assert_eq!(stats.restarts, 0);
            assert_eq!(stats.frames, 0);
            assert_eq!(stats.dropped, 20);
            assert!(!supervisor.is_running().await);
            assert!(supervisor.inner.lock().await.stopped_drop_logged);
            let written = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            assert_eq!(written, 0);

            // A new stop re-arms the report
            supervisor.start().await.unwrap();
            supervisor.stop().await.unwrap();
            assert!(!supervisor.inner.lock().await.stopped_drop_logged);
        }

        #[tokio::test]
        async fn test_cooldown_drops_never_reach_pipeline() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out.h264");
            let supervisor = supervisor(path.clone(), Duration::from_secs(60));
            supervisor.start().await.unwrap();

            // First crash: the gate admits one restart
            let pid = supervisor.pid().await.unwrap();
            kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
            wait_for_state(&supervisor, ForwarderState::Crashed).await;
            supervisor.write_h264(&idr()).await;
            wait_for_len(&path, 7).await;

            // Second crash inside the cooldown
            let pid = supervisor.pid().await.unwrap();
            kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
            wait_for_state(&supervisor, ForwarderState::Crashed).await;

            let marked = AccessUnit::new(40, vec![bytes::Bytes::from_static(&[0x41, 0xde, 0xad])]);
            supervisor.write_h264(&marked).await;
            supervisor.write_h264(&marked).await;
            tokio::time::sleep(Duration::from_millis(50)).await;

            let stats = supervisor.stats();
            assert_eq!(stats.restarts, 1);
            assert_eq!(stats.launches, 2);
            assert_eq!(stats.dropped, 2);
            assert_eq!(supervisor.state().await, ForwarderState::Crashed);

            let written = std::fs::read(&path).unwrap();
            assert_eq!(written, vec![0, 0, 0, 1, 0x65, 0x88, 0x84]);
            assert!(!written.windows(2).any(|w| w == [0xde, 0xad]));
            supervisor.stop().await.unwrap();
        }

        #[tokio::test]
        async fn test_external_kill_restarts_once() {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("out.h264");
            let supervisor = supervisor(path.clone(), Duration::from_secs(5));
            supervisor.start().await.unwrap();

            let pid = supervisor.pid().await.unwrap();
            kill(Pid::from_raw(pid as i32), Signal::SIGKILL).unwrap();
            wait_for_state(&supervisor, ForwarderState::Crashed).await;

            supervisor.write_h264(&idr()).await;
            supervisor.write_h264(&idr()).await;

            let stats = supervisor.stats();
            assert_eq!(stats.restarts, 1);
            assert_eq!(stats.launches, 2);
            assert_eq!(stats.frames, 2);
            assert!(supervisor.is_running().await);

            // The relaunched pipeline truncated the file and got both units
            wait_for_len(&path, 14).await;
            supervisor.stop().await.unwrap();
        }
    }
}
