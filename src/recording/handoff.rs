//! # Archival Handoff
//!
//! The last step of a finalize:
//! 1. **Write** the merged track to a transient WAV file in the temp directory
//! 2. **Archive** it through the durable archive (failure aborts the handoff)
//! 3. **Notify** the downstream coordinator (failure is logged only)
//! 4. **Delete** the transient file, whatever happened before
//!
//! ## Rust Concepts:
//! - **RAII**: `NamedTempFile` deletes its file when dropped, so even a
//!   cancelled or panicking finalize leaves nothing behind. The explicit
//!   `close()` at the end exists to log the outcome.

use crate::archive::coordinator::DownstreamCoordinator;
use crate::archive::storage::{ArchivedAudioReference, AudioArchive};
use crate::audio::track::Track;
use crate::error::FinalizeError;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{error, info};

pub struct ArchivalHandoff {
    temp_dir: PathBuf,
    archive: Arc<dyn AudioArchive>,
    coordinator: Arc<dyn DownstreamCoordinator>,
}

impl ArchivalHandoff {
    pub fn new(
        temp_dir: impl Into<PathBuf>,
        archive: Arc<dyn AudioArchive>,
        coordinator: Arc<dyn DownstreamCoordinator>,
    ) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            archive,
            coordinator,
        }
    }

    /// Persist `track` for `room_id` and notify downstream.
    ///
    /// ## Errors:
    /// - `FinalizeError::Encode` if the transient file cannot be written
    /// - `FinalizeError::Archive` if the durable archive fails
    ///
    /// A coordinator failure is not an error here.
    pub async fn hand_off(
        &self,
        room_id: &str,
        track: &Track,
        participant_ids: &[String],
    ) -> Result<ArchivedAudioReference, FinalizeError> {
        let transient = self.write_transient(track).await?;
        let result = self
            .archive_and_notify(room_id, transient.path(), participant_ids)
            .await;
        cleanup(room_id, transient);
        result
    }

    async fn write_transient(&self, track: &Track) -> Result<NamedTempFile, FinalizeError> {
        let mut encoded = Cursor::new(Vec::new());
        track.write_wav(&mut encoded).map_err(FinalizeError::Encode)?;

        let transient = tempfile::Builder::new()
            .prefix("monitoring-")
            .suffix(".wav")
            .tempfile_in(&self.temp_dir)
            .map_err(FinalizeError::Encode)?;
        tokio::fs::write(transient.path(), encoded.into_inner())
            .await
            .map_err(FinalizeError::Encode)?;

        Ok(transient)
    }

    async fn archive_and_notify(
        &self,
        room_id: &str,
        path: &Path,
        participant_ids: &[String],
    ) -> Result<ArchivedAudioReference, FinalizeError> {
        let reference = self.archive.archive(path, room_id, participant_ids).await?;
        info!(
            room_id = %room_id,
            file_id = %reference.file_id,
            participants = participant_ids.len(),
            "Merged track archived"
        );

        if let Err(e) = self.coordinator.set_monitoring_reference(room_id, &reference).await {
            error!(
                room_id = %room_id,
                file_id = %reference.file_id,
                error = %e,
                "Failed to notify downstream coordinator"
            );
        }

        Ok(reference)
    }
}

fn cleanup(room_id: &str, transient: NamedTempFile) {
    let path = transient.path().to_path_buf();
    match transient.close() {
        Ok(()) => info!(room_id = %room_id, path = %path.display(), "Removed transient file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(room_id = %room_id, path = %path.display(), "Transient file already gone")
        }
        Err(e) => error!(
            room_id = %room_id,
            path = %path.display(),
            error = %e,
            "Failed to remove transient file"
        ),
    }
}
