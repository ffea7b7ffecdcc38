// Transcoder collaborator - converts a raw media file to a target audio codec

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use super::utils::run_output_with_timeout;

#[derive(Debug, Clone)]
pub struct TranscodeError(pub String);

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transcode failed: {}", self.0)
    }
}

impl std::error::Error for TranscodeError {}

/// Trait for media transcoders
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Name of the transcoder (for logging)
    fn name(&self) -> &'static str;

    /// Check if this transcoder is usable on this host
    fn is_available(&self) -> bool;

    /// Convert `input` to the target codec/bitrate. The output lands next
    /// to the input with the codec's extension; returns its path.
    async fn transcode(
        &self,
        input: &Path,
        target_codec: &str,
        target_bitrate: &str,
    ) -> Result<PathBuf, TranscodeError>;
}

/// ffmpeg-based transcoder
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    /// Conversions must not run unbounded; ffmpeg is killed past this
    timeout_secs: u64,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: Self::find_ffmpeg(),
            timeout_secs: 300,
        }
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    /// Find ffmpeg binary in common paths
    fn find_ffmpeg() -> String {
        let common_paths = vec![
            "/opt/homebrew/bin/ffmpeg",
            "/usr/local/bin/ffmpeg",
            "/usr/bin/ffmpeg",
            "ffmpeg",
        ];

        for path in common_paths {
            if std::path::Path::new(path).exists() {
                return path.to_string();
            }
        }

        if let Ok(output) = StdCommand::new("which").arg("ffmpeg").output() {
            if output.status.success() {
                if let Ok(path) = String::from_utf8(output.stdout) {
                    let trimmed = path.trim();
                    if !trimmed.is_empty() {
                        return trimmed.to_string();
                    }
                }
            }
        }

        "ffmpeg".to_string()
    }

    fn codec_args(target_codec: &str) -> Result<(&'static str, &'static str), TranscodeError> {
        // (encoder, extension)
        match target_codec {
            "mp3" => Ok(("libmp3lame", "mp3")),
            "m4a" | "aac" => Ok(("aac", "m4a")),
            "opus" => Ok(("libopus", "opus")),
            other => Err(TranscodeError(format!("Unsupported target codec: {}", other))),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn is_available(&self) -> bool {
        match StdCommand::new(&self.ffmpeg_path).arg("-version").output() {
            Ok(out) => out.status.success(),
            Err(_) => false,
        }
    }

    async fn transcode(
        &self,
        input: &Path,
        target_codec: &str,
        target_bitrate: &str,
    ) -> Result<PathBuf, TranscodeError> {
        let (encoder, extension) = Self::codec_args(target_codec)?;
        let output_path = input.with_extension(extension);

        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-codec:a".to_string(),
            encoder.to_string(),
            "-b:a".to_string(),
            target_bitrate.to_string(),
            output_path.to_string_lossy().to_string(),
        ];

        eprintln!("[Transcode] {} {}", self.ffmpeg_path, args.join(" "));

        let output = run_output_with_timeout(&self.ffmpeg_path, args, self.timeout_secs)
            .await
            .map_err(TranscodeError)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscodeError(
                stderr.lines().last().unwrap_or("ffmpeg failed").to_string(),
            ));
        }

        if !output_path.exists() {
            return Err(TranscodeError(format!(
                "ffmpeg reported success but produced no file at {}",
                output_path.display()
            )));
        }

        Ok(output_path)
    }
}
