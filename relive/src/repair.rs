//! Recording artifact repair.
//!
//! An ungraceful transcoder exit can leave a recording without a usable
//! random-access index. Repair re-multiplexes the artifact into a temporary
//! sibling and atomically replaces the original only on success; the
//! rename is the single point where the original path is touched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::transcode::TranscodePlanner;

pub struct RecordingRepairer {
    planner: Arc<dyn TranscodePlanner>,
}

impl RecordingRepairer {
    pub fn new(planner: Arc<dyn TranscodePlanner>) -> Self {
        Self { planner }
    }

    fn temp_path(path: &Path) -> PathBuf {
        path.with_extension("fixed.mp4")
    }

    /// Attempt to rebuild the artifact at `path` into a valid, seekable
    /// container. Returns whether a repaired file is now in place.
    ///
    /// An empty file cannot be repaired: it is deleted and reported as
    /// failure. On any failure the original bytes are left untouched.
    pub async fn repair(&self, path: &Path) -> bool {
        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Cannot repair recording, file not accessible");
                return false;
            }
        };

        if meta.len() == 0 {
            warn!(path = %path.display(), "Recording is empty; discarding instead of repairing");
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Could not remove empty recording");
            }
            return false;
        }

        info!(path = %path.display(), "Attempting to repair recording");

        let temp = Self::temp_path(path);
        // A stale temp from an earlier crashed attempt blocks the rename.
        if tokio::fs::metadata(&temp).await.is_ok() {
            warn!(temp = %temp.display(), "Removing stale temporary repair file");
            if let Err(e) = tokio::fs::remove_file(&temp).await {
                error!(temp = %temp.display(), error = %e, "Could not remove stale temp file; aborting repair");
                return false;
            }
        }

        let invocation = self.planner.plan_repair(path, &temp);
        let output = match invocation.command().output().await {
            Ok(output) => output,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to spawn repair transcoder");
                return false;
            }
        };

        let temp_valid = tokio::fs::metadata(&temp)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        if output.status.success() && temp_valid {
            match tokio::fs::rename(&temp, path).await {
                Ok(()) => {
                    info!(path = %path.display(), "Recording repaired and replaced");
                    true
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "Failed to replace original with repaired file");
                    let _ = tokio::fs::remove_file(&temp).await;
                    false
                }
            }
        } else {
            error!(
                path = %path.display(),
                status = %output.status,
                temp_valid,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Repair transcoder failed; original left untouched"
            );
            if tokio::fs::metadata(&temp).await.is_ok() {
                debug!(temp = %temp.display(), "Removing failed temporary repair file");
                if let Err(e) = tokio::fs::remove_file(&temp).await {
                    warn!(temp = %temp.display(), error = %e, "Could not remove failed temp file");
                }
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::Invocation;

    /// Planner whose repair invocation is a plain shell command, so tests
    /// can simulate transcoder success and failure without ffmpeg.
    struct ShellRepairPlanner {
        script: String,
    }

    impl TranscodePlanner for ShellRepairPlanner {
        fn plan_record(&self, _input_url: &str, _output: &Path) -> Invocation {
            unimplemented!("repair tests never record")
        }

        fn plan_proxy(&self, _input_url: &str, _playlist: &Path) -> Invocation {
            unimplemented!("repair tests never proxy")
        }

        fn plan_repair(&self, input: &Path, output: &Path) -> Invocation {
            Invocation::new(
                "sh",
                vec![
                    "-c".to_string(),
                    self.script.clone(),
                    "repair".to_string(),
                    input.to_string_lossy().to_string(),
                    output.to_string_lossy().to_string(),
                ],
            )
        }
    }

    fn repairer(script: &str) -> RecordingRepairer {
        RecordingRepairer::new(Arc::new(ShellRepairPlanner {
            script: script.to_string(),
        }))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repair_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.mp4");
        assert!(!repairer("exit 0").repair(&path).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repair_empty_file_deletes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp4");
        tokio::fs::write(&path, b"").await.unwrap();

        assert!(!repairer("exit 0").repair(&path).await);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repair_success_replaces_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp4");
        tokio::fs::write(&path, b"original bytes").await.unwrap();

        // "Transcoder" writes a rebuilt artifact to the temp output.
        let fixed = repairer(r#"printf 'rebuilt container' > "$2""#).repair(&path).await;
        assert!(fixed);

        let content = tokio::fs::read(&path).await.unwrap();
        assert_eq!(content, b"rebuilt container");
        assert!(!path.with_extension("fixed.mp4").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repair_rejected_input_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rejected.mp4");
        tokio::fs::write(&path, b"not actually media").await.unwrap();

        let fixed = repairer("exit 1").repair(&path).await;
        assert!(!fixed);

        let content = tokio::fs::read(&path).await.unwrap();
        assert_eq!(content, b"not actually media");
        assert!(!path.with_extension("fixed.mp4").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_repair_empty_transcoder_output_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("half.mp4");
        tokio::fs::write(&path, b"original").await.unwrap();

        // Exit 0 but the produced temp file is empty.
        let fixed = repairer(r#"printf '' > "$2"; exit 0"#).repair(&path).await;
        assert!(!fixed);
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"original");
        assert!(!path.with_extension("fixed.mp4").exists());
    }
}
