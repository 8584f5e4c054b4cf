//! Process monitoring: one task per supervised child.
//!
//! The monitor owns the `Child`, waits for it to exit (or hard-kills it
//! when the handle's kill token fires), classifies the outcome, and drives
//! the resulting registry updates. It removes its own handle guarded: a
//! superseded monitor never mutates its successor's state.

use std::collections::VecDeque;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::handle::{MonitorSignals, ProcessHandle, ProcessRole};
use crate::domain::StreamStatus;
use crate::registry::StreamRegistry;
use crate::repair::RecordingRepairer;

/// Lines of child stderr kept for failure diagnostics.
const STDERR_TAIL_LINES: usize = 20;

/// Classified child exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit code 0.
    Clean,
    /// Termination caused by the supervisor's own shutdown signal.
    CooperativeStop,
    /// Any other exit.
    Failure,
}

pub(crate) fn classify(status: Option<&ExitStatus>, termination_requested: bool) -> ExitOutcome {
    let Some(status) = status else {
        return ExitOutcome::Failure;
    };
    if status.success() {
        return ExitOutcome::Clean;
    }
    // A supervisor-requested stop counts as cooperative even when the soft
    // signal was ignored and escalation ended in a hard kill.
    if termination_requested {
        return ExitOutcome::CooperativeStop;
    }
    if process_utils::termination_signal(status) == Some(process_utils::SOFT_TERMINATE_SIGNAL) {
        return ExitOutcome::CooperativeStop;
    }
    ExitOutcome::Failure
}

/// Spawn the monitor task for a freshly launched process. The handle must
/// already be committed to the registry.
pub(crate) fn spawn(
    registry: Arc<StreamRegistry>,
    repairer: Arc<RecordingRepairer>,
    child: Child,
    handle: Arc<ProcessHandle>,
    signals: MonitorSignals,
) -> JoinHandle<()> {
    tokio::spawn(run(registry, repairer, child, handle, signals))
}

async fn run(
    registry: Arc<StreamRegistry>,
    repairer: Arc<RecordingRepairer>,
    mut child: Child,
    handle: Arc<ProcessHandle>,
    signals: MonitorSignals,
) {
    let stream_id = handle.stream_id();
    let role = handle.role();
    info!(%stream_id, %role, pid = handle.pid(), "Monitoring process");

    let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(stderr_tail(stderr)));

    let kill = handle.kill_token();
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill.cancelled() => {
            debug!(%stream_id, %role, "Hard kill requested");
            if let Err(e) = child.kill().await {
                warn!(%stream_id, %role, error = %e, "Hard kill failed (process already gone?)");
            }
            child.wait().await
        }
    };

    // Unblock anyone waiting in the terminator before doing slow cleanup.
    signals.notify_exited();

    let stderr = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    let status = match status {
        Ok(status) => Some(status),
        Err(e) => {
            error!(%stream_id, %role, error = %e, "Failed waiting for process");
            None
        }
    };

    let outcome = classify(status.as_ref(), handle.termination_requested());
    match outcome {
        ExitOutcome::Clean => info!(%stream_id, %role, "Process completed cleanly"),
        ExitOutcome::CooperativeStop => {
            info!(%stream_id, %role, status = ?status, "Process stopped cooperatively")
        }
        ExitOutcome::Failure => {
            error!(%stream_id, %role, status = ?status, stderr = %stderr, "Process failed")
        }
    }

    // Guarded removal: if a successor already holds the slot, this monitor
    // is stale and must not touch any further state. Either way the slot is
    // settled from this handle's point of view, which is what release-order
    // waiters care about.
    let still_current = registry.remove_handle_if_current(&handle);
    signals.notify_released();
    if !still_current {
        return;
    }

    match role {
        ProcessRole::Recording => {
            finish_recording(&registry, &repairer, &handle, outcome).await;
        }
        ProcessRole::Proxy => {
            if outcome == ExitOutcome::Failure
                && registry.status(&stream_id) == Some(StreamStatus::Active)
            {
                if let Err(e) = registry.transition(&stream_id, StreamStatus::Error) {
                    warn!(%stream_id, error = %e, "Could not mark stream errored after proxy failure");
                }
            }
        }
    }

    debug!(%stream_id, %role, "Monitor finished");
}

async fn finish_recording(
    registry: &StreamRegistry,
    repairer: &RecordingRepairer,
    handle: &ProcessHandle,
    outcome: ExitOutcome,
) {
    let stream_id = handle.stream_id();
    let recording_path = registry.recording_path(&stream_id);

    if let Some(path) = recording_path.as_deref() {
        let artifact_len = tokio::fs::metadata(path).await.map(|m| m.len()).ok();

        match (outcome, artifact_len) {
            (_, None) => {
                warn!(%stream_id, path = %path.display(), "Recording artifact missing after exit");
            }
            (_, Some(0)) => {
                warn!(%stream_id, path = %path.display(), "Recording artifact is empty; removing");
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %e, "Could not remove empty artifact");
                }
            }
            (ExitOutcome::Clean, Some(_)) => {
                registry.with_record(&stream_id, |record| record.recording_fixed = true);
            }
            (ExitOutcome::Failure, Some(_)) => {
                info!(%stream_id, path = %path.display(), "Recording ended uncleanly; attempting repair");
                let fixed = repairer.repair(path).await;
                registry.with_record(&stream_id, |record| record.recording_fixed = fixed);
            }
            // A cooperative stop leaves the artifact to the operation that
            // requested it (manual stop runs its own repair-or-discard).
            (ExitOutcome::CooperativeStop, Some(_)) => {}
        }
    }

    // Only reset a status this monitor's process owns.
    if registry.status(&stream_id) == Some(StreamStatus::Recording) {
        let next = match outcome {
            ExitOutcome::Failure => StreamStatus::Error,
            _ => StreamStatus::Active,
        };
        if let Err(e) = registry.transition(&stream_id, next) {
            warn!(%stream_id, error = %e, "Could not update status after recording exit");
        }
    }
}

async fn stderr_tail(stderr: ChildStderr) -> String {
    let reader = BufReader::new(stderr);
    let mut lines = reader.lines();
    let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}
