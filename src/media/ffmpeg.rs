// src/media/ffmpeg.rs
// ffmpeg / ffprobe subprocess toolkit

use super::{MediaError, MediaToolkit};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const TARGET_SAMPLE_RATE: &str = "16000";

pub struct FfmpegToolkit {
    ffmpeg_bin: PathBuf,
    ffprobe_bin: PathBuf,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>, ffprobe_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    async fn run<I, S>(
        &self,
        bin: &Path,
        args: I,
        cancel: &CancellationToken,
    ) -> Result<Output, MediaError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let tool = bin.display().to_string();
        let child = Command::new(bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::Spawn {
                tool: tool.clone(),
                message: e.to_string(),
            })?;

        // Dropping the wait future kills the child.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(MediaError::Cancelled),
            out = child.wait_with_output() => out?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MediaError::ToolFailed {
                tool,
                status: output.status.to_string(),
                stderr: last_lines(&stderr, 5),
            });
        }

        Ok(output)
    }
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn extract_audio(
        &self,
        video: &Path,
        out: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError> {
        let args: Vec<&OsStr> = vec![
            OsStr::new("-y"),
            OsStr::new("-i"),
            video.as_os_str(),
            OsStr::new("-vn"),
            OsStr::new("-acodec"),
            OsStr::new("pcm_s16le"),
            OsStr::new("-ar"),
            OsStr::new(TARGET_SAMPLE_RATE),
            OsStr::new("-ac"),
            OsStr::new("1"),
            out.as_os_str(),
        ];
        self.run(&self.ffmpeg_bin, args, cancel).await?;
        ensure_exists(out)
    }

    async fn cut_chunk(
        &self,
        audio: &Path,
        start_seconds: f64,
        duration_seconds: f64,
        out: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), MediaError> {
        let start = format!("{:.3}", start_seconds);
        let duration = format!("{:.3}", duration_seconds);
        let args: Vec<&OsStr> = vec![
            OsStr::new("-y"),
            OsStr::new("-ss"),
            OsStr::new(&start),
            OsStr::new("-i"),
            audio.as_os_str(),
            OsStr::new("-t"),
            OsStr::new(&duration),
            OsStr::new("-acodec"),
            OsStr::new("pcm_s16le"),
            OsStr::new("-ar"),
            OsStr::new(TARGET_SAMPLE_RATE),
            OsStr::new("-ac"),
            OsStr::new("1"),
            out.as_os_str(),
        ];
        self.run(&self.ffmpeg_bin, args, cancel).await?;
        ensure_exists(out)
    }

    async fn probe_duration(
        &self,
        audio: &Path,
        cancel: &CancellationToken,
    ) -> Result<f64, MediaError> {
        let args: Vec<&OsStr> = vec![
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-show_entries"),
            OsStr::new("format=duration"),
            OsStr::new("-of"),
            OsStr::new("default=noprint_wrappers=1:nokey=1"),
            audio.as_os_str(),
        ];
        let output = self.run(&self.ffprobe_bin, args, cancel).await?;
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

fn ensure_exists(path: &Path) -> Result<(), MediaError> {
    if path.exists() {
        Ok(())
    } else {
        Err(MediaError::MissingOutput(path.to_path_buf()))
    }
}

fn parse_duration(stdout: &str) -> Result<f64, MediaError> {
    let trimmed = stdout.trim();
    match trimmed.lines().next().map(str::trim).map(str::parse::<f64>) {
        Some(Ok(secs)) if secs.is_finite() && secs >= 0.0 => Ok(secs),
        _ => Err(MediaError::InvalidDuration(trimmed.to_string())),
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("95.042000\n").unwrap(), 95.042);
        assert!(matches!(
            parse_duration("N/A"),
            Err(MediaError::InvalidDuration(_))
        ));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("-3").is_err());
    }

    #[test]
    fn test_last_lines() {
        assert_eq!(last_lines("a\nb\nc\n", 2), "b\nc");
        assert_eq!(last_lines("only", 5), "only");
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let toolkit = FfmpegToolkit::new(
            "/nonexistent/ffmpeg-for-tests",
            "/nonexistent/ffprobe-for-tests",
        );
        let err = toolkit
            .probe_duration(Path::new("audio.wav"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Spawn { .. }));
    }
}
