//! Escalating graceful termination.

use std::time::Duration;

use process_utils::SignalDelivery;
use tracing::{debug, warn};

use super::handle::ProcessHandle;

/// Terminate a supervised process: soft signal, grace period, hard kill.
///
/// The hard-kill phase waits unbounded, since a killed process must
/// eventually be reaped by its monitor. A process that is already gone at
/// any step is treated as terminated, never as an error.
///
/// Returns only after the monitor has also settled the handle's registry
/// slot, so a caller may immediately start a successor of the same role.
pub async fn terminate(handle: &ProcessHandle, grace: Duration) {
    if handle.has_exited() {
        handle.released().await;
        return;
    }

    handle.request_termination();

    let soft_delivered = match handle.pid() {
        Some(pid) => match process_utils::send_soft_terminate(pid) {
            Ok(SignalDelivery::Delivered) => {
                debug!(pid, role = %handle.role(), "Sent soft termination signal");
                true
            }
            Ok(SignalDelivery::AlreadyExited) => {
                // The monitor will reap it momentarily; the grace wait
                // below resolves as soon as that happens.
                debug!(pid, role = %handle.role(), "Process already gone at soft-signal time");
                true
            }
            Ok(SignalDelivery::Unsupported) => false,
            Err(e) => {
                warn!(pid, error = %e, "Failed to deliver soft termination signal");
                false
            }
        },
        None => false,
    };

    if soft_delivered {
        if tokio::time::timeout(grace, handle.exited()).await.is_ok() {
            debug!(role = %handle.role(), "Process exited within grace period");
            handle.released().await;
            return;
        }
        warn!(
            pid = handle.pid(),
            role = %handle.role(),
            grace_secs = grace.as_secs_f64(),
            "Process ignored soft termination; escalating to hard kill"
        );
    }

    handle.fire_kill();
    handle.exited().await;
    handle.released().await;
    debug!(role = %handle.role(), "Process reaped after hard kill");
}
