//! Process handle: the registry-visible association between a stream and
//! one running child process.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Role a supervised process plays for its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    Recording,
    Proxy,
}

impl ProcessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Proxy => "proxy",
        }
    }
}

impl std::fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Handle to one running child process.
///
/// The `tokio::process::Child` itself is owned exclusively by the monitor
/// task; everyone else interacts through this handle: the terminator flags
/// a termination request and fires the kill token, the monitor publishes
/// exit and registry release through the watch channels.
#[derive(Debug)]
pub struct ProcessHandle {
    id: Uuid,
    stream_id: Uuid,
    role: ProcessRole,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    /// Fired to make the monitor hard-kill the child.
    kill: CancellationToken,
    /// Set before any soft signal so the monitor can classify the exit as
    /// a cooperative stop even when escalation ended in a hard kill.
    termination_requested: AtomicBool,
    exit_rx: watch::Receiver<bool>,
    released_rx: watch::Receiver<bool>,
}

/// Sender half of the monitor notifications; held by the monitor task.
#[derive(Debug)]
pub struct MonitorSignals {
    exit_tx: watch::Sender<bool>,
    released_tx: watch::Sender<bool>,
}

impl MonitorSignals {
    /// Publish that the child has been reaped.
    pub fn notify_exited(&self) {
        let _ = self.exit_tx.send(true);
    }

    /// Publish that the handle's registry slot has been dealt with, so a
    /// subsequent start of the same role cannot observe the stale entry.
    pub fn notify_released(&self) {
        let _ = self.released_tx.send(true);
    }
}

impl ProcessHandle {
    pub fn new(
        stream_id: Uuid,
        role: ProcessRole,
        pid: Option<u32>,
    ) -> (Arc<Self>, MonitorSignals) {
        let (exit_tx, exit_rx) = watch::channel(false);
        let (released_tx, released_rx) = watch::channel(false);
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            stream_id,
            role,
            pid,
            started_at: Utc::now(),
            kill: CancellationToken::new(),
            termination_requested: AtomicBool::new(false),
            exit_rx,
            released_rx,
        });
        (
            handle,
            MonitorSignals {
                exit_tx,
                released_tx,
            },
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stream_id(&self) -> Uuid {
        self.stream_id
    }

    pub fn role(&self) -> ProcessRole {
        self.role
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn request_termination(&self) {
        self.termination_requested.store(true, Ordering::SeqCst);
    }

    pub fn termination_requested(&self) -> bool {
        self.termination_requested.load(Ordering::SeqCst)
    }

    /// Ask the monitor to hard-kill the child.
    pub fn fire_kill(&self) {
        self.kill.cancel();
    }

    /// Token the monitor selects on next to `child.wait()`.
    pub fn kill_token(&self) -> CancellationToken {
        self.kill.clone()
    }

    pub fn has_exited(&self) -> bool {
        *self.exit_rx.borrow()
    }

    /// Wait until the monitor reports the child exited. Resolves
    /// immediately once the monitor is gone, since the child cannot
    /// outlive its monitor.
    pub async fn exited(&self) {
        let mut rx = self.exit_rx.clone();
        let _ = rx.wait_for(|exited| *exited).await;
    }

    /// Wait until the monitor has released this handle's registry slot.
    pub async fn released(&self) {
        let mut rx = self.released_rx.clone();
        let _ = rx.wait_for(|released| *released).await;
    }
}
