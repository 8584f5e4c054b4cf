//! Child-process helpers shared across the workspace: console-window
//! suppression on Windows and portable signal delivery/classification.

use std::ffi::OsStr;
use std::process::ExitStatus;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Signal number used for soft (graceful) termination requests.
///
/// Matches SIGTERM on Unix; on other targets it exists only so exit
/// classification has a stable value to compare against.
pub const SOFT_TERMINATE_SIGNAL: i32 = 15;

/// Create a `std::process::Command` that will not pop up a console window
/// when spawned from a windowed process on Windows. No-op elsewhere.
pub fn blocking_command(program: impl AsRef<OsStr>) -> std::process::Command {
    #[allow(unused_mut)]
    let mut cmd = std::process::Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Create a `tokio::process::Command` with the same window suppression.
#[cfg(feature = "tokio")]
pub fn command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    #[allow(unused_mut)]
    let mut cmd = tokio::process::Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Result of attempting to deliver a soft termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    /// The signal was sent to a live process.
    Delivered,
    /// The process was already gone when the signal was sent.
    AlreadyExited,
    /// The target platform has no soft termination signal.
    Unsupported,
}

/// Send the soft termination signal (SIGTERM) to a process by pid.
///
/// A vanished process is reported as [`SignalDelivery::AlreadyExited`]
/// rather than an error, since callers treat it as "already terminated".
#[cfg(unix)]
pub fn send_soft_terminate(pid: u32) -> std::io::Result<SignalDelivery> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => Ok(SignalDelivery::Delivered),
        Err(Errno::ESRCH) => Ok(SignalDelivery::AlreadyExited),
        Err(errno) => Err(std::io::Error::from_raw_os_error(errno as i32)),
    }
}

/// On targets without SIGTERM the soft phase is skipped entirely; callers
/// escalate straight to a hard kill.
#[cfg(not(unix))]
pub fn send_soft_terminate(_pid: u32) -> std::io::Result<SignalDelivery> {
    Ok(SignalDelivery::Unsupported)
}

/// The signal that terminated a process, if it died from one.
#[cfg(unix)]
pub fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
pub fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
