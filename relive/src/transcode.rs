//! Transcoder invocation planning.
//!
//! The supervisor core treats the transcoder as an opaque child process; the
//! exact command line is supplied by a [`TranscodePlanner`] collaborator.
//! The production [`FfmpegPlanner`] builds invocations that satisfy the
//! behavioral contract: recordings land in a container that tolerates
//! abrupt termination, proxies produce a rolling self-pruning HLS window
//! with keyframes aligned to the segment cadence.

use std::path::Path;
use std::process::Stdio;

/// One ready-to-spawn transcoder command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build a command with the supervisor's standard stdio wiring: stdin
    /// closed, stdout discarded, stderr captured.
    pub fn command(&self) -> tokio::process::Command {
        let mut cmd = process_utils::command(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Collaborator that constructs the three transcoder invocations.
pub trait TranscodePlanner: Send + Sync {
    /// Record `input_url` into a durable container at `output`.
    fn plan_record(&self, input_url: &str, output: &Path) -> Invocation;
    /// Re-package `input_url` into a rolling HLS playlist at `playlist`.
    fn plan_proxy(&self, input_url: &str, playlist: &Path) -> Invocation;
    /// Rebuild an existing artifact at `input` into `output` under the same
    /// output contract as `plan_record`.
    fn plan_repair(&self, input: &Path, output: &Path) -> Invocation;
}

/// FFmpeg-based planner.
pub struct FfmpegPlanner {
    binary_path: String,
    hls_segment_secs: u32,
    hls_window_size: u32,
}

/// Assumed frame cadence used to pin keyframe intervals to segment length.
const KEYFRAMES_PER_SEC: u32 = 24;

impl FfmpegPlanner {
    pub fn new(binary_path: impl Into<String>, hls_segment_secs: u32, hls_window_size: u32) -> Self {
        Self {
            binary_path: binary_path.into(),
            hls_segment_secs,
            hls_window_size,
        }
    }

    fn input_args(input: &str) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "-fflags".to_string(),
            "+genpts".to_string(),
            "-i".to_string(),
            input.to_string(),
        ]
    }

    /// Output half of the durable-recording contract: copy video, re-encode
    /// audio to AAC for compatibility, fragmented MP4 so an interrupted
    /// write stays readable, timestamps normalized, all streams mapped.
    fn durable_output_args(output: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-c:v", "copy",
            "-c:a", "aac",
            "-b:a", "192k",
            "-ar", "48000",
            "-strict", "experimental",
            "-movflags", "+faststart+frag_keyframe+empty_moov",
            "-avoid_negative_ts", "make_zero",
            "-map", "0",
            "-f", "mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(output.to_string_lossy().to_string());
        args
    }
}

impl TranscodePlanner for FfmpegPlanner {
    fn plan_record(&self, input_url: &str, output: &Path) -> Invocation {
        let mut args = Self::input_args(input_url);
        args.extend(Self::durable_output_args(output));
        Invocation::new(&self.binary_path, args)
    }

    fn plan_proxy(&self, input_url: &str, playlist: &Path) -> Invocation {
        let gop = self.hls_segment_secs * KEYFRAMES_PER_SEC;

        let mut args = Self::input_args(input_url);
        args.extend(
            [
                // Re-encode for broad browser playback
                "-c:v", "libx264",
                "-preset", "veryfast",
                "-tune", "zerolatency",
                "-profile:v", "main",
                "-level", "4.1",
                "-crf", "23",
                "-c:a", "aac",
                "-b:a", "192k",
                "-ar", "48000",
                "-strict", "experimental",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        // Rolling window: old segments pruned, keyframes pinned to the
        // segment cadence so players can seek near the live edge.
        args.extend([
            "-hls_time".to_string(),
            self.hls_segment_secs.to_string(),
            "-hls_list_size".to_string(),
            self.hls_window_size.to_string(),
            "-hls_flags".to_string(),
            "delete_segments+program_date_time".to_string(),
            "-start_number".to_string(),
            "0".to_string(),
            "-g".to_string(),
            gop.to_string(),
            "-keyint_min".to_string(),
            gop.to_string(),
            "-sc_threshold".to_string(),
            "0".to_string(),
            "-f".to_string(),
            "hls".to_string(),
            playlist.to_string_lossy().to_string(),
        ]);
        Invocation::new(&self.binary_path, args)
    }

    fn plan_repair(&self, input: &Path, output: &Path) -> Invocation {
        let mut args = Self::input_args(&input.to_string_lossy());
        args.extend(Self::durable_output_args(output));
        Invocation::new(&self.binary_path, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn planner() -> FfmpegPlanner {
        FfmpegPlanner::new("ffmpeg", 4, 10)
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2)
            .any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_record_invocation_is_durable() {
        let out = PathBuf::from("recordings/out.mp4");
        let invocation = planner().plan_record("https://cdn.example/stream", &out);

        assert_eq!(invocation.program, "ffmpeg");
        let args = &invocation.args;
        assert!(has_pair(args, "-i", "https://cdn.example/stream"));
        assert!(has_pair(args, "-c:v", "copy"));
        assert!(has_pair(args, "-c:a", "aac"));
        assert!(has_pair(
            args,
            "-movflags",
            "+faststart+frag_keyframe+empty_moov"
        ));
        assert!(has_pair(args, "-avoid_negative_ts", "make_zero"));
        assert!(has_pair(args, "-map", "0"));
        // Output path is the final argument
        assert_eq!(args.last().unwrap(), &out.to_string_lossy().to_string());
    }

    #[test]
    fn test_proxy_invocation_rolls_a_bounded_window() {
        let playlist = PathBuf::from("hls/live_x/playlist.m3u8");
        let invocation = planner().plan_proxy("https://cdn.example/stream", &playlist);

        let args = &invocation.args;
        assert!(has_pair(args, "-hls_time", "4"));
        assert!(has_pair(args, "-hls_list_size", "10"));
        assert!(has_pair(args, "-hls_flags", "delete_segments+program_date_time"));
        // Keyframe interval pinned to the segment cadence
        assert!(has_pair(args, "-g", "96"));
        assert!(has_pair(args, "-keyint_min", "96"));
        assert!(has_pair(args, "-sc_threshold", "0"));
        assert!(has_pair(args, "-f", "hls"));
        assert_eq!(
            args.last().unwrap(),
            &playlist.to_string_lossy().to_string()
        );
    }

    #[test]
    fn test_repair_matches_record_output_contract() {
        let input = PathBuf::from("recordings/broken.mp4");
        let output = PathBuf::from("recordings/broken.fixed.mp4");
        let invocation = planner().plan_repair(&input, &output);

        let args = &invocation.args;
        assert!(has_pair(args, "-i", "recordings/broken.mp4"));
        assert!(has_pair(
            args,
            "-movflags",
            "+faststart+frag_keyframe+empty_moov"
        ));
        assert_eq!(args.last().unwrap(), "recordings/broken.fixed.mp4");
    }
}
