//! Launching supervised transcoder processes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::handle::{ProcessHandle, ProcessRole};
use super::monitor;
use crate::Result;
use crate::domain::{PlatformKind, StreamSnapshot, StreamStatus};
use crate::error::Error;
use crate::registry::StreamRegistry;
use crate::repair::RecordingRepairer;
use crate::resolve::UrlResolver;
use crate::transcode::TranscodePlanner;

/// Launcher tunables, split out of [`crate::config::AppConfig`].
#[derive(Debug, Clone)]
pub(crate) struct LauncherSettings {
    pub recordings_dir: PathBuf,
    pub hls_root: PathBuf,
    /// Window after spawn in which an exit counts as a startup failure.
    pub startup_grace: Duration,
}

/// Resolves a playable URL and starts transcoder child processes for the
/// proxy and recording roles.
pub struct ProcessLauncher {
    registry: Arc<StreamRegistry>,
    resolver: Arc<dyn UrlResolver>,
    planner: Arc<dyn TranscodePlanner>,
    repairer: Arc<RecordingRepairer>,
    settings: LauncherSettings,
}

impl ProcessLauncher {
    pub(crate) fn new(
        registry: Arc<StreamRegistry>,
        resolver: Arc<dyn UrlResolver>,
        planner: Arc<dyn TranscodePlanner>,
        repairer: Arc<RecordingRepairer>,
        settings: LauncherSettings,
    ) -> Self {
        Self {
            registry,
            resolver,
            planner,
            repairer,
            settings,
        }
    }

    /// Start a recording process. Returns the output artifact path.
    pub async fn start_recording(&self, stream_id: Uuid) -> Result<PathBuf> {
        let snapshot = self
            .registry
            .get(&stream_id)
            .ok_or_else(|| Error::not_found("stream", stream_id))?;

        // Reserve the role slot before any suspension point so a concurrent
        // second start fails fast with AlreadyRunning. A live recording also
        // surfaces as AlreadyRunning here, before the status check can call
        // it a state problem.
        let reservation = self.registry.reserve(stream_id, ProcessRole::Recording)?;

        if snapshot.status != StreamStatus::Active {
            return Err(Error::validation(format!(
                "cannot record stream in status {}",
                snapshot.status
            )));
        }

        let input_url = self.resolve_input(&snapshot).await?;

        tokio::fs::create_dir_all(&self.settings.recordings_dir).await?;
        let output = self.settings.recordings_dir.join(recording_filename(&snapshot));

        info!(%stream_id, output = %output.display(), "Starting recording");
        let invocation = self.planner.plan_record(&input_url, &output);
        let mut child = self.confirm_startup(invocation, Some(&output)).await?;

        let (handle, signals) = ProcessHandle::new(stream_id, ProcessRole::Recording, child.id());
        reservation.commit(handle.clone());

        if let Err(e) = self.registry.transition(&stream_id, StreamStatus::Recording) {
            // The stream vanished or changed state mid-launch. No monitor
            // owns the child yet, so the launcher reaps it here.
            warn!(%stream_id, error = %e, "Stream changed under a starting recording; reaping");
            let _ = child.kill().await;
            self.registry.remove_handle_if_current(&handle);
            return Err(e);
        }
        self.registry.with_record(&stream_id, |record| {
            record.recording_path = Some(output.clone());
            record.recording_fixed = false;
        });

        monitor::spawn(
            Arc::clone(&self.registry),
            Arc::clone(&self.repairer),
            child,
            handle,
            signals,
        );

        info!(%stream_id, "Recording started");
        Ok(output)
    }

    /// Start a proxy process. Returns the playlist locator.
    pub async fn start_proxy(&self, stream_id: Uuid) -> Result<String> {
        let snapshot = self
            .registry
            .get(&stream_id)
            .ok_or_else(|| Error::not_found("stream", stream_id))?;

        let reservation = self.registry.reserve(stream_id, ProcessRole::Proxy)?;

        let input_url = self.resolve_input(&snapshot).await?;

        let proxy_id = Uuid::new_v4();
        let hls_dir = self.settings.hls_root.join(format!("live_{proxy_id}"));
        tokio::fs::create_dir_all(&hls_dir).await?;
        let playlist = hls_dir.join("playlist.m3u8");

        info!(%stream_id, playlist = %playlist.display(), "Starting proxy stream");
        let invocation = self.planner.plan_proxy(&input_url, &playlist);
        let child = match self.confirm_startup(invocation, None).await {
            Ok(child) => child,
            Err(e) => {
                // Nothing useful can be in a dir the transcoder never wrote to.
                let _ = tokio::fs::remove_dir_all(&hls_dir).await;
                return Err(e);
            }
        };

        let (handle, signals) = ProcessHandle::new(stream_id, ProcessRole::Proxy, child.id());
        reservation.commit(handle.clone());

        let proxy_url = format!("/hls/live_{proxy_id}/playlist.m3u8");
        self.registry.with_record(&stream_id, |record| {
            record.proxy_url = Some(proxy_url.clone());
        });

        monitor::spawn(
            Arc::clone(&self.registry),
            Arc::clone(&self.repairer),
            child,
            handle,
            signals,
        );

        info!(%stream_id, proxy_url = %proxy_url, "Proxy stream started");
        Ok(proxy_url)
    }

    /// Resolve a directly playable URL, with the documented fallback: an
    /// unresolvable `Other` source is used verbatim.
    async fn resolve_input(&self, snapshot: &StreamSnapshot) -> Result<String> {
        let source = self
            .registry
            .source(&snapshot.id)
            .ok_or_else(|| Error::not_found("stream", snapshot.id))?;

        match self.resolver.resolve(&source).await {
            Ok(url) => Ok(url),
            Err(e) if source.platform == PlatformKind::Other => {
                warn!(
                    stream_id = %snapshot.id,
                    error = %e,
                    "Resolver failed for direct source; using original URL verbatim"
                );
                Ok(source.url)
            }
            Err(e) => Err(e),
        }
    }

    /// Spawn the transcoder and watch the immediate-crash window. An exit
    /// inside the window is a startup failure surfaced to the caller, not a
    /// runtime failure.
    async fn confirm_startup(
        &self,
        invocation: crate::transcode::Invocation,
        output: Option<&std::path::Path>,
    ) -> Result<tokio::process::Child> {
        let mut child = invocation
            .command()
            .spawn()
            .map_err(|e| Error::Other(format!("Failed to spawn transcoder: {e}")))?;

        tokio::time::sleep(self.settings.startup_grace).await;

        match child.try_wait() {
            Ok(None) => Ok(child),
            Ok(Some(status)) => {
                let collected = child.wait_with_output().await;
                let stderr = collected
                    .map(|out| String::from_utf8_lossy(&out.stderr).trim().to_string())
                    .unwrap_or_default();
                error!(status = %status, stderr = %stderr, "Transcoder died inside the startup window");

                // Discard a zero-byte artifact from the failed start.
                if let Some(path) = output
                    && let Ok(meta) = tokio::fs::metadata(path).await
                    && meta.len() == 0
                {
                    let _ = tokio::fs::remove_file(path).await;
                }

                Err(Error::StartupFailed { stderr })
            }
            Err(e) => {
                error!(error = %e, "Could not check transcoder startup state");
                let _ = child.kill().await;
                Err(Error::StartupFailed {
                    stderr: e.to_string(),
                })
            }
        }
    }
}

/// Build a recording filename: `{platform}_{identifier}_{title}_{ts}.mp4`
/// with the title made filesystem-safe.
fn recording_filename(snapshot: &StreamSnapshot) -> String {
    let identifier = snapshot.external_id.as_deref().unwrap_or("stream");
    let title = sanitize_title(snapshot.title.as_deref().unwrap_or("untitled"));
    let timestamp = Utc::now().timestamp();
    format!("{}_{identifier}_{title}_{timestamp}.mp4", snapshot.platform)
}

/// Keep alphanumerics, `_` and `-`; everything else becomes `_`. The result
/// is trimmed of separators and capped at 50 characters.
fn sanitize_title(title: &str) -> String {
    let safe: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = safe.trim_matches(['_', '-']);
    let capped: String = trimmed.chars().take(50).collect();
    if capped.is_empty() {
        "untitled".to_string()
    } else {
        capped
    }
}
