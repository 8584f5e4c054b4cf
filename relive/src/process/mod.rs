//! Supervised child-process layer: handles, launching, monitoring, and
//! escalating termination.

mod handle;
mod launcher;
mod monitor;
mod terminate;

pub use handle::{MonitorSignals, ProcessHandle, ProcessRole};
pub use launcher::ProcessLauncher;
pub use monitor::ExitOutcome;
pub use terminate::terminate;

pub(crate) use launcher::LauncherSettings;

pub(crate) fn launcher_settings(config: &crate::config::AppConfig) -> LauncherSettings {
    LauncherSettings {
        recordings_dir: config.recordings_dir.clone(),
        hls_root: config.hls_root.clone(),
        startup_grace: config.startup_grace,
    }
}
