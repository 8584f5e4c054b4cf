//! Stream liveness validation.
//!
//! Probing goes through an external collaborator ([`LivenessProber`]) run as
//! a subprocess with a bounded timeout. Every probe failure (non-zero exit,
//! timeout, unparseable output) is non-fatal and maps to "not live";
//! nothing propagates past this boundary.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{PlatformKind, StreamSource};

/// What a probe learned about a source.
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    pub is_live: bool,
    pub title: Option<String>,
}

impl ProbeOutcome {
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn live(title: Option<String>) -> Self {
        Self {
            is_live: true,
            title,
        }
    }
}

/// External liveness probing collaborator.
#[async_trait]
pub trait LivenessProber: Send + Sync {
    async fn probe(&self, source: &StreamSource) -> ProbeOutcome;
}

/// Production prober shelling out to `yt-dlp` and `ffprobe`.
pub struct SubprocessProber {
    ytdlp_path: String,
    ffprobe_path: String,
    timeout: Duration,
}

impl SubprocessProber {
    pub fn new(
        ytdlp_path: impl Into<String>,
        ffprobe_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            ffprobe_path: ffprobe_path.into(),
            timeout,
        }
    }

    /// Run one probe subprocess, returning trimmed stdout on a clean exit.
    /// Failures and timeouts are logged and collapse to `None`.
    async fn run(&self, program: &str, args: &[&str]) -> Option<String> {
        let mut cmd = process_utils::command(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(Ok(output)) => {
                warn!(
                    program,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "Probe subprocess failed"
                );
                None
            }
            Ok(Err(e)) => {
                warn!(program, error = %e, "Failed to run probe subprocess");
                None
            }
            Err(_) => {
                warn!(program, timeout_secs = self.timeout.as_secs(), "Probe timed out");
                None
            }
        }
    }

    async fn probe_youtube(&self, source: &StreamSource) -> ProbeOutcome {
        let args = [
            "--skip-download",
            "--no-warnings",
            "--print",
            "is_live",
            source.url.as_str(),
        ];
        let Some(is_live_raw) = self.run(&self.ytdlp_path, &args).await else {
            return ProbeOutcome::offline();
        };

        if is_live_raw != "True" {
            info!(url = %source.url, raw = %is_live_raw, "YouTube stream is not live");
            return ProbeOutcome::offline();
        }

        // Live: a second query for the title; a failure here does not
        // demote the stream back to offline.
        let title_args = [
            "--skip-download",
            "--no-warnings",
            "--print",
            "title",
            source.url.as_str(),
        ];
        let title = self.run(&self.ytdlp_path, &title_args).await;
        if title.is_none() {
            warn!(url = %source.url, "Could not extract title for live YouTube stream");
        }
        ProbeOutcome::live(title)
    }

    async fn probe_twitch(&self, source: &StreamSource) -> ProbeOutcome {
        // A resolvable playlist URL is treated as "live enough to try".
        let args = ["-g", "--no-warnings", source.url.as_str()];
        match self.run(&self.ytdlp_path, &args).await {
            Some(media_url) if !media_url.is_empty() => {
                debug!(url = %source.url, "Twitch stream resolved a playable URL");
                let channel = source.external_id.as_deref().unwrap_or("unknown");
                ProbeOutcome::live(Some(format!("Twitch Stream: {channel}")))
            }
            _ => ProbeOutcome::offline(),
        }
    }

    async fn probe_other(&self, source: &StreamSource) -> ProbeOutcome {
        // Any decodable video stream means the source is playable.
        let args = [
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=codec_name",
            "-of",
            "default=nw=1:nk=1",
            source.url.as_str(),
        ];
        match self.run(&self.ffprobe_path, &args).await {
            Some(codec) if !codec.is_empty() => {
                debug!(url = %source.url, codec = %codec, "Found decodable video stream");
                ProbeOutcome::live(Some("Livestream (direct source)".to_string()))
            }
            _ => ProbeOutcome::offline(),
        }
    }
}

#[async_trait]
impl LivenessProber for SubprocessProber {
    async fn probe(&self, source: &StreamSource) -> ProbeOutcome {
        match source.platform {
            PlatformKind::Youtube => self.probe_youtube(source).await,
            PlatformKind::Twitch => self.probe_twitch(source).await,
            PlatformKind::Facebook => {
                // Known limitation: Facebook liveness cannot be probed
                // reliably without authentication, so a supplied URL is
                // assumed live. This is a placeholder validator.
                warn!(url = %source.url, "Facebook liveness is unverifiable; assuming live");
                let id = source.external_id.as_deref().unwrap_or("Unknown ID");
                ProbeOutcome::live(Some(format!("Facebook Stream ({id})")))
            }
            PlatformKind::Other => self.probe_other(source).await,
        }
    }
}

/// Validates sources against the probing collaborator and fills in the
/// validated fields on success.
pub struct StreamValidator {
    prober: Arc<dyn LivenessProber>,
    twitch_player_parent: String,
}

impl StreamValidator {
    pub fn new(prober: Arc<dyn LivenessProber>, twitch_player_parent: impl Into<String>) -> Self {
        Self {
            prober,
            twitch_player_parent: twitch_player_parent.into(),
        }
    }

    /// Probe the source. Returns whether it is live together with the
    /// updated source (`title`/`embed_url` populated on success).
    pub async fn validate(&self, source: &StreamSource) -> (bool, StreamSource) {
        info!(url = %source.url, platform = %source.platform, "Validating stream");

        let outcome = self.prober.probe(source).await;
        let mut updated = source.clone();
        updated.is_live = outcome.is_live;

        if outcome.is_live {
            updated.title = outcome.title;
            updated.embed_url = updated.embed_link(&self.twitch_player_parent);
            info!(url = %updated.url, title = ?updated.title, "Stream validated live");
        } else {
            info!(url = %updated.url, "Stream is not live");
        }

        (outcome.is_live, updated)
    }
}
