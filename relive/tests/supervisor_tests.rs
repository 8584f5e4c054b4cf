//! Integration tests for the stream supervisor.
//!
//! These drive the public operations end-to-end with stub collaborators:
//! a canned prober/resolver and a shell-script "transcoder", so no real
//! ffmpeg or yt-dlp is needed.

#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use relive::Error;
use relive::collaborator::CollaboratorTask;
use relive::config::AppConfig;
use relive::domain::{StreamSource, StreamStatus};
use relive::probe::{LivenessProber, ProbeOutcome};
use relive::resolve::UrlResolver;
use relive::supervisor::StreamSupervisor;
use relive::transcode::{Invocation, TranscodePlanner};

struct StubProber {
    live: bool,
}

#[async_trait]
impl LivenessProber for StubProber {
    async fn probe(&self, _source: &StreamSource) -> ProbeOutcome {
        if self.live {
            ProbeOutcome::live(Some("Stub Stream".to_string()))
        } else {
            ProbeOutcome::offline()
        }
    }
}

struct StaticResolver;

#[async_trait]
impl UrlResolver for StaticResolver {
    async fn resolve(&self, source: &StreamSource) -> relive::Result<String> {
        Ok(source.url.clone())
    }
}

/// Shell-script transcoder. Each script runs as
/// `sh -c <script> <role> <input> <output>`, so `$1` is the input and `$2`
/// the output path.
struct ShellPlanner {
    record: String,
    proxy: String,
    repair: String,
}

impl ShellPlanner {
    fn invocation(script: &str, role: &str, input: &str, output: &str) -> Invocation {
        Invocation::new(
            "sh",
            vec![
                "-c".to_string(),
                script.to_string(),
                role.to_string(),
                input.to_string(),
                output.to_string(),
            ],
        )
    }
}

impl TranscodePlanner for ShellPlanner {
    fn plan_record(&self, input_url: &str, output: &Path) -> Invocation {
        Self::invocation(&self.record, "record", input_url, &output.to_string_lossy())
    }

    fn plan_proxy(&self, input_url: &str, playlist: &Path) -> Invocation {
        Self::invocation(&self.proxy, "proxy", input_url, &playlist.to_string_lossy())
    }

    fn plan_repair(&self, input: &Path, output: &Path) -> Invocation {
        Self::invocation(
            &self.repair,
            "repair",
            &input.to_string_lossy(),
            &output.to_string_lossy(),
        )
    }
}

/// A recorder that writes some data and then keeps running until signalled.
const RECORD_LONG_RUNNING: &str = r#"printf 'recorded data' > "$2"; exec sleep 30"#;
/// A recorder that ignores the soft termination signal.
const RECORD_TRAPS_TERM: &str =
    r#"trap '' TERM; printf 'recorded data' > "$2"; while true; do sleep 1; done"#;
/// A repair pass that rewrites the artifact.
const REPAIR_OK: &str = r#"printf 'rebuilt container' > "$2""#;
const REPAIR_FAILS: &str = "exit 1";
const PROXY_LONG_RUNNING: &str = "exec sleep 30";

struct Harness {
    supervisor: StreamSupervisor,
    _dir: tempfile::TempDir,
}

fn harness(planner: ShellPlanner) -> Harness {
    harness_with(planner, true)
}

fn harness_with(planner: ShellPlanner, live: bool) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        recordings_dir: dir.path().join("recordings"),
        hls_root: dir.path().join("hls"),
        log_dir: dir.path().join("logs"),
        startup_grace: Duration::from_millis(300),
        stop_grace: Duration::from_secs(2),
        cleanup_grace: Duration::from_secs(1),
        shutdown_grace: Duration::from_millis(500),
        collaborator_wait: Duration::from_secs(1),
        ..AppConfig::default()
    };

    let supervisor = StreamSupervisor::with_collaborators(
        config,
        Arc::new(StubProber { live }),
        Arc::new(StaticResolver),
        Arc::new(planner),
    );
    Harness {
        supervisor,
        _dir: dir,
    }
}

async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    condition()
}

#[tokio::test]
async fn test_add_requires_validated_live_source() {
    let h = harness_with(
        ShellPlanner {
            record: RECORD_LONG_RUNNING.into(),
            proxy: PROXY_LONG_RUNNING.into(),
            repair: REPAIR_OK.into(),
        },
        false,
    );

    let err = h.supervisor.add_url("https://twitch.tv/offline_chan").await;
    assert!(matches!(err, Err(Error::Validation(_))));

    // An unvalidated source is rejected directly too.
    let source = h.supervisor.detect("https://twitch.tv/offline_chan");
    assert!(matches!(h.supervisor.add(source), Err(Error::Validation(_))));

    assert!(h.supervisor.list().is_empty());
}

#[tokio::test]
async fn test_double_start_recording_is_rejected() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();
    h.supervisor.start_recording(id).await.unwrap();

    let second = h.supervisor.start_recording(id).await;
    assert!(matches!(second, Err(Error::AlreadyRunning { .. })));

    // Still exactly one live recording.
    let snapshot = h.supervisor.get(&id).unwrap();
    assert!(snapshot.is_recording);
    assert_eq!(snapshot.status, StreamStatus::Recording);

    h.supervisor.cleanup(id).await;
}

#[tokio::test]
async fn test_stop_recording_resets_state_even_when_repair_fails() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_FAILS.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();
    let path = h.supervisor.start_recording(id).await.unwrap();

    let outcome = h.supervisor.stop_recording(id).await.unwrap();

    assert!(outcome.fix_attempted);
    assert_eq!(outcome.fix_successful, Some(false));
    assert!(!outcome.usable);
    // The broken artifact is still reported: a broken file beats no file.
    assert_eq!(outcome.recording_path.as_deref(), Some(path.as_path()));

    let snapshot = h.supervisor.get(&id).unwrap();
    assert_eq!(snapshot.status, StreamStatus::Active);
    assert!(snapshot.recording_path.is_none());
    assert!(!snapshot.is_recording);

    h.supervisor.cleanup(id).await;
}

#[tokio::test]
async fn test_stop_recording_with_successful_repair() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();
    let path = h.supervisor.start_recording(id).await.unwrap();

    let outcome = h.supervisor.stop_recording(id).await.unwrap();

    assert!(outcome.fix_attempted);
    assert_eq!(outcome.fix_successful, Some(true));
    assert!(outcome.usable);

    let content = tokio::fs::read(&path).await.unwrap();
    assert_eq!(content, b"rebuilt container");

    let snapshot = h.supervisor.get(&id).unwrap();
    assert_eq!(snapshot.status, StreamStatus::Active);
    assert!(snapshot.recording_fixed);

    h.supervisor.cleanup(id).await;
}

#[tokio::test]
async fn test_stop_returns_within_grace_despite_trapped_signal() {
    let h = harness(ShellPlanner {
        record: RECORD_TRAPS_TERM.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();
    h.supervisor.start_recording(id).await.unwrap();

    let started = tokio::time::Instant::now();
    let outcome = h.supervisor.stop_recording(id).await.unwrap();
    let elapsed = started.elapsed();

    // Escalation: 2s grace, then a hard kill that lands promptly.
    assert!(elapsed < Duration::from_secs(8), "stop took {elapsed:?}");
    assert!(outcome.fix_attempted);

    let snapshot = h.supervisor.get(&id).unwrap();
    assert_eq!(snapshot.status, StreamStatus::Active);

    h.supervisor.cleanup(id).await;
}

#[tokio::test]
async fn test_startup_failure_is_synchronous_and_frees_the_slot() {
    let h = harness(ShellPlanner {
        record: "echo 'no such codec' >&2; exit 3".into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();

    let err = h.supervisor.start_recording(id).await;
    match err {
        Err(Error::StartupFailed { stderr }) => assert!(stderr.contains("no such codec")),
        other => panic!("expected StartupFailed, got {other:?}"),
    }

    // The role slot is free again: the retry fails the same way instead of
    // reporting AlreadyRunning, and the stream is still healthy.
    let retry = h.supervisor.start_recording(id).await;
    assert!(matches!(retry, Err(Error::StartupFailed { .. })));

    let snapshot = h.supervisor.get(&id).unwrap();
    assert_eq!(snapshot.status, StreamStatus::Active);
    assert!(!snapshot.is_recording);

    h.supervisor.cleanup(id).await;
}

#[tokio::test]
async fn test_stop_without_recording_is_not_found() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();
    assert!(matches!(
        h.supervisor.stop_recording(id).await,
        Err(Error::NotFound { .. })
    ));

    // Unknown stream id as well.
    let unknown = uuid::Uuid::new_v4();
    assert!(matches!(
        h.supervisor.stop_recording(unknown).await,
        Err(Error::NotFound { .. })
    ));

    h.supervisor.cleanup(id).await;
}

#[tokio::test]
async fn test_cleanup_is_idempotent() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();
    h.supervisor.start_recording(id).await.unwrap();

    h.supervisor.cleanup(id).await;
    assert!(h.supervisor.get(&id).is_none());

    // Second cleanup of the same id, and cleanup of a never-existing id,
    // are both silent no-ops.
    h.supervisor.cleanup(id).await;
    h.supervisor.cleanup(uuid::Uuid::new_v4()).await;
    assert!(h.supervisor.get(&id).is_none());
}

#[tokio::test]
async fn test_proxy_runtime_failure_marks_stream_errored() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        // Survives the startup window, then dies.
        proxy: "sleep 1; exit 7".into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();
    let proxy_url = h.supervisor.start_proxy(id).await.unwrap();
    assert!(proxy_url.ends_with("/playlist.m3u8"));

    // The failure is never thrown at a caller; it shows up as a status
    // transition observed by the monitor.
    let errored = wait_until(Duration::from_secs(10), || {
        h.supervisor.get(&id).map(|s| s.status) == Some(StreamStatus::Error)
    })
    .await;
    assert!(errored);

    h.supervisor.cleanup(id).await;
}

#[tokio::test]
async fn test_proxy_cooperative_stop_is_not_an_error() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();
    h.supervisor.start_proxy(id).await.unwrap();

    h.supervisor.shutdown_all().await;

    // The handle drains without flipping the stream into an error state.
    let drained = wait_until(Duration::from_secs(5), || {
        h.supervisor
            .get(&id)
            .map(|s| s.status == StreamStatus::Active)
            .unwrap_or(false)
    })
    .await;
    assert!(drained);

    h.supervisor.cleanup(id).await;
}

#[tokio::test]
async fn test_shutdown_all_terminates_every_role() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let first = h.supervisor.add_url("https://twitch.tv/chan_one").await.unwrap();
    let second = h.supervisor.add_url("https://twitch.tv/chan_two").await.unwrap();
    h.supervisor.start_recording(first).await.unwrap();
    h.supervisor.start_proxy(second).await.unwrap();

    h.supervisor.shutdown_all().await;

    // Monitors remove their handles once the processes are reaped.
    let drained = wait_until(Duration::from_secs(5), || {
        h.supervisor
            .get(&first)
            .map(|s| !s.is_recording)
            .unwrap_or(false)
    })
    .await;
    assert!(drained);
}

#[tokio::test]
async fn test_cleanup_cancels_collaborator_task() {
    let h = harness(ShellPlanner {
        record: RECORD_LONG_RUNNING.into(),
        proxy: PROXY_LONG_RUNNING.into(),
        repair: REPAIR_OK.into(),
    });

    let id = h.supervisor.add_url("https://twitch.tv/chan").await.unwrap();

    let cancelled = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&cancelled);
    let task = CollaboratorTask::spawn(move |token| async move {
        token.cancelled().await;
        observed.store(true, Ordering::SeqCst);
    });

    let task_id = h.supervisor.attach_collaborator(id, task).await.unwrap();
    assert_eq!(h.supervisor.get(&id).unwrap().collaborator_ref, Some(task_id));

    h.supervisor.cleanup(id).await;
    assert!(cancelled.load(Ordering::SeqCst));
}
