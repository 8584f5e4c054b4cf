//! Environment-driven application configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::Result;
use crate::error::Error;

/// Application configuration.
///
/// Every field can be overridden through an environment variable (load a
/// `.env` file first via `dotenvy` if desired):
///
/// - `RELIVE_RECORDINGS_DIR`, `RELIVE_HLS_ROOT`, `RELIVE_LOG_DIR`
/// - `FFMPEG_PATH`, `FFPROBE_PATH`, `YTDLP_PATH`
/// - `RELIVE_PROBE_TIMEOUT_SECS`, `RELIVE_STARTUP_GRACE_MS`
/// - `RELIVE_STOP_GRACE_SECS`, `RELIVE_CLEANUP_GRACE_SECS`,
///   `RELIVE_SHUTDOWN_GRACE_SECS`, `RELIVE_COLLABORATOR_WAIT_SECS`
/// - `PLAYER_PARENT_DOMAIN` (Twitch embed player parent)
/// - `RELIVE_HLS_SEGMENT_SECS`, `RELIVE_HLS_WINDOW_SIZE`
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory recording artifacts are written to.
    pub recordings_dir: PathBuf,
    /// Root directory for proxy HLS output (one subdirectory per proxy).
    pub hls_root: PathBuf,
    /// Directory for rolling log files.
    pub log_dir: PathBuf,

    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub ytdlp_path: String,

    /// Upper bound for one liveness/resolution probe subprocess.
    pub probe_timeout: Duration,
    /// Window after spawn in which an exited transcoder counts as a
    /// startup failure rather than a runtime failure.
    pub startup_grace: Duration,
    /// Grace period for a manual recording stop (lets the transcoder flush).
    pub stop_grace: Duration,
    /// Grace period for generic stream cleanup.
    pub cleanup_grace: Duration,
    /// Grace period for process-wide shutdown, best-effort.
    pub shutdown_grace: Duration,
    /// Bounded wait when cancelling a stream's collaborator task.
    pub collaborator_wait: Duration,

    /// Domain serving the Twitch embed player.
    pub twitch_player_parent: String,

    pub hls_segment_secs: u32,
    pub hls_window_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recordings_dir: PathBuf::from("recordings"),
            hls_root: PathBuf::from("hls"),
            log_dir: PathBuf::from("logs"),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            ytdlp_path: "yt-dlp".to_string(),
            probe_timeout: Duration::from_secs(30),
            startup_grace: Duration::from_millis(500),
            stop_grace: Duration::from_secs(10),
            cleanup_grace: Duration::from_secs(3),
            shutdown_grace: Duration::from_secs(1),
            collaborator_wait: Duration::from_secs(1),
            twitch_player_parent: "localhost".to_string(),
            hls_segment_secs: 4,
            hls_window_size: 10,
        }
    }
}

impl AppConfig {
    /// Build a configuration from the process environment, falling back to
    /// the defaults above for anything unset.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            recordings_dir: env_or("RELIVE_RECORDINGS_DIR", defaults.recordings_dir)?,
            hls_root: env_or("RELIVE_HLS_ROOT", defaults.hls_root)?,
            log_dir: env_or("RELIVE_LOG_DIR", defaults.log_dir)?,
            ffmpeg_path: env_or("FFMPEG_PATH", defaults.ffmpeg_path)?,
            ffprobe_path: env_or("FFPROBE_PATH", defaults.ffprobe_path)?,
            ytdlp_path: env_or("YTDLP_PATH", defaults.ytdlp_path)?,
            probe_timeout: secs_env_or("RELIVE_PROBE_TIMEOUT_SECS", defaults.probe_timeout)?,
            startup_grace: millis_env_or("RELIVE_STARTUP_GRACE_MS", defaults.startup_grace)?,
            stop_grace: secs_env_or("RELIVE_STOP_GRACE_SECS", defaults.stop_grace)?,
            cleanup_grace: secs_env_or("RELIVE_CLEANUP_GRACE_SECS", defaults.cleanup_grace)?,
            shutdown_grace: secs_env_or("RELIVE_SHUTDOWN_GRACE_SECS", defaults.shutdown_grace)?,
            collaborator_wait: secs_env_or(
                "RELIVE_COLLABORATOR_WAIT_SECS",
                defaults.collaborator_wait,
            )?,
            twitch_player_parent: env_or("PLAYER_PARENT_DOMAIN", defaults.twitch_player_parent)?,
            hls_segment_secs: env_or("RELIVE_HLS_SEGMENT_SECS", defaults.hls_segment_secs)?,
            hls_window_size: env_or("RELIVE_HLS_WINDOW_SIZE", defaults.hls_window_size)?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn secs_env_or(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_secs(env_or(key, default.as_secs())?))
}

fn millis_env_or(key: &str, default: Duration) -> Result<Duration> {
    Ok(Duration::from_millis(env_or(
        key,
        default.as_millis() as u64,
    )?))
}
