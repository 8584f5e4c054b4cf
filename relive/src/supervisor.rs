//! The composition root: wires detection, validation, launching,
//! monitoring, termination, and repair together behind the public
//! operations a hosting HTTP/CLI layer may call.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Result;
use crate::collaborator::CollaboratorTask;
use crate::config::AppConfig;
use crate::detect;
use crate::domain::{StreamRecord, StreamSnapshot, StreamSource, StreamStatus};
use crate::error::Error;
use crate::probe::{LivenessProber, StreamValidator, SubprocessProber};
use crate::process::launcher_settings;
use crate::process::{ProcessLauncher, ProcessRole, terminate};
use crate::registry::StreamRegistry;
use crate::repair::RecordingRepairer;
use crate::resolve::{UrlResolver, YtDlpResolver};
use crate::transcode::{FfmpegPlanner, TranscodePlanner};

/// Result of stopping a recording.
#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub stream_id: Uuid,
    /// Final artifact path, when a non-empty file exists. Present even if
    /// repair failed: a broken file still beats no file.
    pub recording_path: Option<PathBuf>,
    pub fix_attempted: bool,
    pub fix_successful: Option<bool>,
    /// Whether a playable artifact is in place.
    pub usable: bool,
}

/// Owns the registry and the collaborator seams; exposes the public
/// stream operations.
pub struct StreamSupervisor {
    config: AppConfig,
    registry: Arc<StreamRegistry>,
    validator: StreamValidator,
    launcher: ProcessLauncher,
    repairer: Arc<RecordingRepairer>,
}

impl StreamSupervisor {
    /// Production wiring: yt-dlp/ffprobe probing and resolution, ffmpeg
    /// transcoding.
    pub fn new(config: AppConfig) -> Self {
        let prober: Arc<dyn LivenessProber> = Arc::new(SubprocessProber::new(
            config.ytdlp_path.clone(),
            config.ffprobe_path.clone(),
            config.probe_timeout,
        ));
        let resolver: Arc<dyn UrlResolver> = Arc::new(YtDlpResolver::new(
            config.ytdlp_path.clone(),
            config.probe_timeout,
        ));
        let planner: Arc<dyn TranscodePlanner> = Arc::new(FfmpegPlanner::new(
            config.ffmpeg_path.clone(),
            config.hls_segment_secs,
            config.hls_window_size,
        ));
        Self::with_collaborators(config, prober, resolver, planner)
    }

    /// Wiring with explicit collaborators (the seam integration tests use).
    pub fn with_collaborators(
        config: AppConfig,
        prober: Arc<dyn LivenessProber>,
        resolver: Arc<dyn UrlResolver>,
        planner: Arc<dyn TranscodePlanner>,
    ) -> Self {
        let registry = Arc::new(StreamRegistry::new());
        let repairer = Arc::new(RecordingRepairer::new(Arc::clone(&planner)));
        let validator = StreamValidator::new(prober, config.twitch_player_parent.clone());
        let launcher = ProcessLauncher::new(
            Arc::clone(&registry),
            resolver,
            planner,
            Arc::clone(&repairer),
            launcher_settings(&config),
        );

        Self {
            config,
            registry,
            validator,
            launcher,
            repairer,
        }
    }

    /// Classify a raw URL. Pure; never fails.
    pub fn detect(&self, url: &str) -> StreamSource {
        detect::detect(url)
    }

    /// Probe a classified source for liveness.
    pub async fn validate(&self, source: &StreamSource) -> (bool, StreamSource) {
        self.validator.validate(source).await
    }

    /// Track a validated-live source. Returns the new stream id.
    pub fn add(&self, source: StreamSource) -> Result<Uuid> {
        if !source.is_live {
            return Err(Error::validation(
                "source has not been validated as live",
            ));
        }

        let record = StreamRecord::new(source);
        let id = self.registry.insert(record);
        self.registry.transition(&id, StreamStatus::Active)?;
        info!(stream_id = %id, "Stream added");
        Ok(id)
    }

    /// Convenience: detect, validate, and add a raw URL in one step.
    pub async fn add_url(&self, url: &str) -> Result<Uuid> {
        let source = self.detect(url);
        let (is_live, validated) = self.validate(&source).await;
        if !is_live {
            return Err(Error::validation(format!(
                "stream is not live or could not be validated: {url}"
            )));
        }
        self.add(validated)
    }

    pub fn get(&self, id: &Uuid) -> Option<StreamSnapshot> {
        self.registry.get(id)
    }

    pub fn list(&self) -> Vec<StreamSnapshot> {
        self.registry.list()
    }

    /// Start recording. Never idempotent: a second start while a recording
    /// handle is live fails with `AlreadyRunning`.
    pub async fn start_recording(&self, id: Uuid) -> Result<PathBuf> {
        self.launcher.start_recording(id).await
    }

    /// Start a browser-playable rolling HLS proxy for the stream.
    pub async fn start_proxy(&self, id: Uuid) -> Result<String> {
        self.launcher.start_proxy(id).await
    }

    /// Stop a running recording: graceful termination with the long grace
    /// period, then repair-or-discard of whatever artifact exists.
    pub async fn stop_recording(&self, id: Uuid) -> Result<StopOutcome> {
        if !self.registry.contains(&id) {
            return Err(Error::not_found("stream", id));
        }

        let Some(handle) = self.registry.live_handle(&id, ProcessRole::Recording) else {
            // No process but a stale Recording status means bookkeeping got
            // out of sync (e.g. a crashed monitor); put the record right.
            if self.registry.status(&id) == Some(StreamStatus::Recording) {
                warn!(stream_id = %id, "Recording status without a live process; resetting");
                let _ = self.registry.transition(&id, StreamStatus::Active);
                self.registry.with_record(&id, |record| {
                    record.recording_path = None;
                    record.recording_fixed = false;
                });
            }
            return Err(Error::not_found("recording process for stream", id));
        };

        let recording_path = self.registry.recording_path(&id);

        info!(stream_id = %id, pid = handle.pid(), "Stopping recording");
        terminate(&handle, self.config.stop_grace).await;

        let mut outcome = StopOutcome {
            stream_id: id,
            recording_path: None,
            fix_attempted: false,
            fix_successful: None,
            usable: false,
        };

        if let Some(path) = recording_path.as_deref() {
            let artifact_len = tokio::fs::metadata(path).await.map(|m| m.len()).ok();
            match artifact_len {
                Some(len) if len > 0 => {
                    info!(stream_id = %id, path = %path.display(), "Finalizing recording artifact");
                    outcome.fix_attempted = true;
                    let fixed = self.repairer.repair(path).await;
                    outcome.fix_successful = Some(fixed);

                    let still_valid = tokio::fs::metadata(path)
                        .await
                        .map(|m| m.len() > 0)
                        .unwrap_or(false);
                    if still_valid {
                        outcome.recording_path = Some(path.to_path_buf());
                        outcome.usable = fixed;
                    }
                }
                Some(_) => {
                    warn!(stream_id = %id, path = %path.display(), "Recording is empty after stop; discarding");
                    let _ = tokio::fs::remove_file(path).await;
                }
                None => {
                    warn!(stream_id = %id, path = %path.display(), "Recording artifact not found after stop");
                }
            }
        }

        // Regardless of the artifact's fate the stream goes back to idle.
        self.registry.with_record(&id, |record| {
            record.recording_path = None;
            record.recording_fixed = outcome.usable;
        });
        let _ = self.registry.transition(&id, StreamStatus::Active);

        Ok(outcome)
    }

    /// Release everything a stream owns and remove it. Idempotent: unknown
    /// or already-removed ids are a no-op.
    pub async fn cleanup(&self, id: Uuid) {
        let handles = self.registry.handles_for(&id);
        if !handles.is_empty() {
            info!(stream_id = %id, count = handles.len(), "Terminating processes during cleanup");
            for handle in &handles {
                terminate(handle, self.config.cleanup_grace).await;
            }
        }

        let Some(mut record) = self.registry.remove(&id) else {
            return;
        };

        if let Some(task) = record.take_collaborator() {
            task.cancel(self.config.collaborator_wait).await;
        }

        // Cleanup does not repair; it only discards an empty leftover.
        if let Some(path) = record.recording_path.as_deref()
            && let Ok(meta) = tokio::fs::metadata(path).await
            && meta.len() == 0
        {
            warn!(path = %path.display(), "Removing empty recording during cleanup");
            let _ = tokio::fs::remove_file(path).await;
        }

        info!(stream_id = %id, "Stream removed");
    }

    /// Best-effort termination of every supervised process, for
    /// process-wide shutdown. Does not wait for repairs and does not retry.
    pub async fn shutdown_all(&self) {
        let handles = self.registry.live_handles();
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "Shutting down all supervised processes");
        futures::future::join_all(
            handles
                .iter()
                .map(|handle| terminate(handle, self.config.shutdown_grace)),
        )
        .await;
    }

    /// Attach an owned background collaborator (e.g. a live transcription)
    /// to a stream. A previous task is cancelled with a bounded wait.
    pub async fn attach_collaborator(&self, id: Uuid, task: CollaboratorTask) -> Result<Uuid> {
        let task_id = task.id();
        let replaced = self.registry.attach_collaborator(&id, task)?;
        if let Some(old) = replaced {
            old.cancel(self.config.collaborator_wait).await;
        }
        Ok(task_id)
    }
}
