//! # Stream Decoding
//!
//! Participants send their audio as an opaque container stream (typically
//! WebM/Opus from a browser `MediaRecorder`). Turning those bytes into samples
//! is delegated to a decode capability so the assembly pipeline never cares
//! which codec a client used.
//!
//! ## Implementations:
//! - **FfmpegDecoder**: pipes the raw bytes through an `ffmpeg` child process
//! - Tests substitute their own `AudioDecoder` so no process is spawned

use crate::audio::track::Track;
use crate::config::DecoderConfig;
use crate::error::DecodeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Converts one participant's concatenated raw bytes into samples.
///
/// A non-zero exit status and malformed output are both reported as
/// `DecodeError`; callers decide whether a failure is fatal.
#[async_trait]
pub trait AudioDecoder: Send + Sync {
    async fn decode(&self, raw: Vec<u8>) -> Result<Track, DecodeError>;
}

/// Decodes through an external `ffmpeg` binary.
///
/// ## Command line:
/// `ffmpeg -hide_banner -loglevel error -i pipe:0 -map_metadata -1 -flags +bitexact -acodec pcm_s16le -f wav -y <scratch.wav>`
///
/// No `-ar`/`-ac`: each stream keeps its native rate and channel count, and
/// the merge step converts only when participants differ. The output goes to
/// a scratch file rather than stdout because ffmpeg can only fill in the WAV
/// header sizes on a seekable output.
pub struct FfmpegDecoder {
    ffmpeg_path: String,
    scratch_dir: PathBuf,
    timeout: Duration,
}

impl FfmpegDecoder {
    pub fn new(config: &DecoderConfig, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            scratch_dir: scratch_dir.into(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn args(&self, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-flags".to_string(),
            "+bitexact".to_string(),
            "-acodec".to_string(),
            "pcm_s16le".to_string(),
            "-f".to_string(),
            "wav".to_string(),
            "-y".to_string(),
            output.display().to_string(),
        ]
    }
}

#[async_trait]
impl AudioDecoder for FfmpegDecoder {
    async fn decode(&self, raw: Vec<u8>) -> Result<Track, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::EmptyInput);
        }

        // removed on drop, whichever way this function returns
        let scratch = tempfile::Builder::new()
            .prefix("decode-")
            .suffix(".wav")
            .tempfile_in(&self.scratch_dir)
            .map_err(DecodeError::Io)?;

        let input_len = raw.len();
        let mut child = Command::new(&self.ffmpeg_path)
            .args(self.args(scratch.path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DecodeError::Spawn)?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            DecodeError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "decoder stdin unavailable",
            ))
        })?;

        // stdin must be fed while stderr is drained, or a chatty ffmpeg deadlocks on full pipes
        let writer = tokio::spawn(async move {
            stdin.write_all(&raw).await?;
            stdin.shutdown().await
        });

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(DecodeError::Io)?,
            // dropping the wait future kills the child
            Err(_) => return Err(DecodeError::Timeout(self.timeout.as_secs())),
        };

        if !output.status.success() {
            return Err(DecodeError::ProcessFailed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        match writer.await {
            Ok(Ok(())) => {}
            // ffmpeg may stop reading once it has what it needs
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
            Ok(Err(e)) => return Err(DecodeError::Io(e)),
            Err(join_error) => {
                return Err(DecodeError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    join_error.to_string(),
                )))
            }
        }

        let wav_bytes = tokio::fs::read(scratch.path()).await.map_err(DecodeError::Io)?;
        let track = Track::from_wav(&wav_bytes)?;
        debug!(
            input_bytes = input_len,
            sample_rate = track.sample_rate,
            channels = track.channels,
            frames = track.frames(),
            duration_secs = track.duration_seconds(),
            "Decoded participant stream"
        );
        Ok(track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder_with(path: &str, scratch_dir: &Path) -> FfmpegDecoder {
        FfmpegDecoder::new(
            &DecoderConfig {
                ffmpeg_path: path.to_string(),
                timeout_secs: 5,
            },
            scratch_dir,
        )
    }

    fn scratch_is_empty(dir: &tempfile::TempDir) -> bool {
        std::fs::read_dir(dir.path()).unwrap().next().is_none()
    }

    #[test]
    fn test_ffmpeg_arguments_keep_native_format() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.wav");
        let args = decoder_with("ffmpeg", dir.path()).args(&output);

        assert_eq!(&args[3..5], &["-i".to_string(), "pipe:0".to_string()]);
        assert!(!args.iter().any(|arg| arg == "-ar" || arg == "-ac"));
        assert!(args.windows(2).any(|w| w[0] == "-acodec" && w[1] == "pcm_s16le"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "wav"));
        assert_eq!(args.last().map(String::as_str), output.to_str());
    }

    #[tokio::test]
    async fn test_empty_input_is_a_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = decoder_with("ffmpeg", dir.path()).decode(Vec::new()).await;
        assert!(matches!(result, Err(DecodeError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = decoder_with("/nonexistent/ffmpeg-binary", dir.path())
            .decode(vec![1, 2, 3, 4])
            .await;
        assert!(matches!(result, Err(DecodeError::Spawn(_))));
        assert!(scratch_is_empty(&dir));
    }

    #[tokio::test]
    async fn test_missing_scratch_dir_is_an_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let result = decoder_with("ffmpeg", &dir.path().join("missing"))
            .decode(vec![1, 2, 3, 4])
            .await;
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_a_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        // `false` ignores its arguments and exits 1
        let result = decoder_with("false", dir.path()).decode(vec![1, 2, 3, 4]).await;
        assert!(matches!(
            result,
            Err(DecodeError::ProcessFailed { status: Some(1), .. })
        ));
        assert!(scratch_is_empty(&dir));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_without_wav_output_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        // `true` exits 0 and leaves the scratch file empty
        let result = decoder_with("true", dir.path()).decode(vec![1, 2, 3, 4]).await;
        assert!(matches!(result, Err(DecodeError::MalformedOutput(_))));
        assert!(scratch_is_empty(&dir));
    }
}
