//! # Durable Archive
//!
//! Where a finished room's merged track ends up. The finalizer only sees the
//! `AudioArchive` trait; `LocalAudioArchive` is the implementation the
//! server wires in, copying files into the permanent audio directory.
//!
//! ## Storage Layout:
//! ```text
//! storage_system2/
//! ├── audio/   <file_id>.wav   (permanent, written here)
//! └── tmp/     monitoring-*.wav (transient, owned by the handoff)
//! ```

use crate::error::ArchiveError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Handle returned after a successful archive, forwarded to the downstream
/// coordinator as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedAudioReference {
    pub file_id: String,
    pub file_path: String,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub format: String,
    pub created_at: DateTime<Utc>,
    pub call_session_id: String,
    pub participant_ids: Vec<String>,
}

/// Everything the local archive remembers about one stored file.
#[derive(Debug, Clone, Serialize)]
pub struct ArchivedAudioMetadata {
    pub file_id: String,
    pub call_session_id: String,
    pub permanent_path: String,
    pub original_filename: String,
    pub file_size_bytes: u64,
    pub duration_seconds: f64,
    pub format: String,
    pub archived_at: DateTime<Utc>,
    pub participant_ids: Vec<String>,
}

/// Persists a finished audio file.
///
/// `source` is only guaranteed to exist for the duration of the call; an
/// implementation must copy it rather than keep the path.
#[async_trait]
pub trait AudioArchive: Send + Sync {
    async fn archive(
        &self,
        source: &Path,
        call_session_id: &str,
        participant_ids: &[String],
    ) -> Result<ArchivedAudioReference, ArchiveError>;
}

/// Filesystem archive with an in-memory metadata index.
pub struct LocalAudioArchive {
    audio_dir: PathBuf,
    metadata: RwLock<HashMap<String, ArchivedAudioMetadata>>,
}

impl LocalAudioArchive {
    pub fn new(audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            audio_dir: audio_dir.into(),
            metadata: RwLock::new(HashMap::new()),
        }
    }

    pub fn retrieve_metadata(&self, file_id: &str) -> Option<ArchivedAudioMetadata> {
        self.metadata
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(file_id)
            .cloned()
    }

    pub fn archived_count(&self) -> usize {
        self.metadata
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl AudioArchive for LocalAudioArchive {
    async fn archive(
        &self,
        source: &Path,
        call_session_id: &str,
        participant_ids: &[String],
    ) -> Result<ArchivedAudioReference, ArchiveError> {
        match tokio::fs::metadata(source).await {
            Ok(meta) if meta.is_file() && meta.len() == 0 => {
                return Err(ArchiveError::InvalidAudio(format!(
                    "{} is empty",
                    source.display()
                )))
            }
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(ArchiveError::SourceMissing(source.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::SourceMissing(source.to_path_buf()))
            }
            Err(e) => return Err(ArchiveError::Io(e)),
        }

        let format = source
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("wav")
            .to_lowercase();
        let file_id = Uuid::new_v4().to_string();
        let permanent_path = self.audio_dir.join(format!("{}.{}", file_id, format));

        let file_size_bytes = tokio::fs::copy(source, &permanent_path).await?;

        let duration_seconds = match tokio::fs::read(&permanent_path).await {
            Ok(bytes) => wav_duration(&bytes).unwrap_or_else(|reason| {
                warn!(file_id = %file_id, reason = %reason, "Could not read audio duration");
                0.0
            }),
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "Could not reopen archived file");
                0.0
            }
        };

        let archived_at = Utc::now();
        let metadata = ArchivedAudioMetadata {
            file_id: file_id.clone(),
            call_session_id: call_session_id.to_string(),
            permanent_path: permanent_path.display().to_string(),
            original_filename: source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_size_bytes,
            duration_seconds,
            format: format.clone(),
            archived_at,
            participant_ids: participant_ids.to_vec(),
        };

        self.metadata
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(file_id.clone(), metadata);

        info!(
            file_id = %file_id,
            call_session_id = %call_session_id,
            path = %permanent_path.display(),
            bytes = file_size_bytes,
            duration_secs = duration_seconds,
            "Archived audio file"
        );

        Ok(ArchivedAudioReference {
            file_id,
            file_path: permanent_path.display().to_string(),
            duration_seconds,
            file_size_bytes,
            format,
            created_at: archived_at,
            call_session_id: call_session_id.to_string(),
            participant_ids: participant_ids.to_vec(),
        })
    }
}

/// Duration in seconds from a WAV file's header and sample count.
fn wav_duration(bytes: &[u8]) -> Result<f64, String> {
    let (header, data) = wav::read(&mut Cursor::new(bytes)).map_err(|e| e.to_string())?;
    if header.sampling_rate == 0 || header.channel_count == 0 {
        return Err("header has zero sample rate or channels".to_string());
    }

    let samples = match data {
        wav::BitDepth::Eight(v) => v.len(),
        wav::BitDepth::Sixteen(v) => v.len(),
        wav::BitDepth::TwentyFour(v) => v.len(),
        wav::BitDepth::ThirtyTwoFloat(v) => v.len(),
        wav::BitDepth::Empty => 0,
    };
    let frames = samples / header.channel_count as usize;
    Ok(frames as f64 / header.sampling_rate as f64)
}
