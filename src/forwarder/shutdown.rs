//! Process shutdown escalation
//!
//! ```text
//! SIGINT ──wait──► SIGTERM ──wait──► SIGKILL ──wait──► leak warning
//!    └── exited ──────┴── exited ───────┴── exited ──► done
//! ```
//!
//! SIGINT first so the sink can flush its last fragment.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Interrupt,
    Terminate,
    Kill,
}

impl Stage {
    pub const ORDER: [Stage; 3] = [Stage::Interrupt, Stage::Terminate, Stage::Kill];

    #[cfg(unix)]
    fn signal(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match self {
            Stage::Interrupt => Signal::SIGINT,
            Stage::Terminate => Signal::SIGTERM,
            Stage::Kill => Signal::SIGKILL,
        }
    }
}

/// Bounded wait after each stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPlan {
    pub interrupt: Duration,
    pub terminate: Duration,
    pub kill: Duration,
}

impl EscalationPlan {
    pub fn wait_for(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Interrupt => self.interrupt,
            Stage::Terminate => self.terminate,
            Stage::Kill => self.kill,
        }
    }
}

impl Default for EscalationPlan {
    fn default() -> Self {
        Self {
            interrupt: Duration::from_secs(5),
            terminate: Duration::from_secs(3),
            kill: Duration::from_secs(2),
        }
    }
}

/// Something that can be signalled and waited on
#[async_trait]
pub trait Terminable: Send {
    /// Process id for logging
    fn id(&self) -> Option<u32>;

    fn signal(&mut self, stage: Stage);

    /// `true` once the process has exited, `false` on timeout
    async fn wait_exit(&mut self, wait: Duration) -> bool;
}

/// Outcome of [`escalate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Already gone before any signal
    AlreadyExited,
    /// Exited after this stage's signal
    ExitedAfter(Stage),
    /// Still not confirmed after SIGKILL
    Unconfirmed,
}

/// Signal `target` with increasing force until it exits
pub async fn escalate<T: Terminable>(target: &mut T, plan: &EscalationPlan) -> Shutdown {
    if target.wait_exit(Duration::ZERO).await {
        return Shutdown::AlreadyExited;
    }

    for stage in Stage::ORDER {
        tracing::debug!(pid = ?target.id(), stage = ?stage, "Signalling pipeline");
        target.signal(stage);

        if target.wait_exit(plan.wait_for(stage)).await {
            tracing::info!(pid = ?target.id(), stage = ?stage, "Pipeline exited");
            return Shutdown::ExitedAfter(stage);
        }
    }

    tracing::error!(
        pid = ?target.id(),
        "Pipeline did not exit after SIGKILL, process may have leaked"
    );
    Shutdown::Unconfirmed
}

#[cfg(unix)]
fn send_signal(pid: u32, stage: Stage) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    // Pipelines run in their own process group
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), stage.signal()) {
        tracing::debug!(pid = pid, stage = ?stage, error = %e, "Signal not delivered");
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, stage: Stage) {
    tracing::warn!(pid = pid, stage = ?stage, "Process signals unsupported on this platform");
}

/// A process owned by another task that reports exit through a watch channel
#[derive(Debug)]
pub struct WatchedProcess {
    pid: Option<u32>,
    exited: watch::Receiver<bool>,
}

impl WatchedProcess {
    pub fn new(pid: Option<u32>, exited: watch::Receiver<bool>) -> Self {
        Self { pid, exited }
    }
}

#[async_trait]
impl Terminable for WatchedProcess {
    fn id(&self) -> Option<u32> {
        self.pid
    }

    fn signal(&mut self, stage: Stage) {
        if let Some(pid) = self.pid {
            send_signal(pid, stage);
        }
    }

    async fn wait_exit(&mut self, wait: Duration) -> bool {
        let exited = *self.exited.borrow();
        if exited {
            return true;
        }
        // A dropped sender means the watcher finished
        match timeout(wait, self.exited.wait_for(|exited| *exited)).await {
            Ok(_) => true,
            Err(_) => false,
        }
    }
}

#[async_trait]
impl Terminable for Child {
    fn id(&self) -> Option<u32> {
        Child::id(self)
    }

    fn signal(&mut self, stage: Stage) {
        if let Some(pid) = Child::id(self) {
            send_signal(pid, stage);
        }
        if stage == Stage::Kill {
            let _ = self.start_kill();
        }
    }

    async fn wait_exit(&mut self, wait: Duration) -> bool {
        if matches!(self.try_wait(), Ok(Some(_))) {
            return true;
        }
        matches!(timeout(wait, self.wait()).await, Ok(Ok(_)))
    }
}
