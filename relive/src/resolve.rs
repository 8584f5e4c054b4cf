//! Playable media URL resolution.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::Result;
use crate::domain::StreamSource;
use crate::error::Error;

/// External collaborator that turns a platform page URL into a directly
/// playable media URL.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, source: &StreamSource) -> Result<String>;
}

/// Production resolver shelling out to `yt-dlp -g`.
pub struct YtDlpResolver {
    binary_path: String,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(binary_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary_path: binary_path.into(),
            timeout,
        }
    }
}

#[async_trait]
impl UrlResolver for YtDlpResolver {
    async fn resolve(&self, source: &StreamSource) -> Result<String> {
        let mut cmd = process_utils::command(&self.binary_path);
        cmd.args(["-g", "--no-warnings", source.url.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(url = %source.url, error = %e, "Failed to run URL resolver");
                return Err(Error::ResolutionFailed(e.to_string()));
            }
            Err(_) => {
                warn!(url = %source.url, "URL resolution timed out");
                return Err(Error::ResolutionFailed("resolver timed out".to_string()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(url = %source.url, status = %output.status, stderr = %stderr, "URL resolution failed");
            return Err(Error::ResolutionFailed(if stderr.is_empty() {
                format!("resolver exited with {}", output.status)
            } else {
                stderr
            }));
        }

        // yt-dlp may print one URL per selected format; the first line is
        // the one we hand to the transcoder.
        let resolved = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        if resolved.is_empty() {
            return Err(Error::ResolutionFailed(
                "resolver produced no URL".to_string(),
            ));
        }

        debug!(url = %source.url, "Resolved playable media URL");
        Ok(resolved)
    }
}
