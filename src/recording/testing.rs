//! Test doubles for the recording core's collaborators.

use crate::archive::coordinator::DownstreamCoordinator;
use crate::archive::storage::{ArchivedAudioReference, AudioArchive};
use crate::audio::decoder::AudioDecoder;
use crate::audio::track::Track;
use crate::error::{ArchiveError, DecodeError, NotifyError};
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Little-endian bytes for mono samples, as a decoder would emit them.
pub fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Treats input as raw 16 kHz mono PCM. `b"corrupt"` and empty input fail.
pub struct ScriptedDecoder {
    calls: AtomicUsize,
}

impl ScriptedDecoder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioDecoder for ScriptedDecoder {
    async fn decode(&self, raw: Vec<u8>) -> Result<Track, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if raw.is_empty() {
            return Err(DecodeError::EmptyInput);
        }
        if raw == b"corrupt" {
            return Err(DecodeError::ProcessFailed {
                status: Some(1),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        Track::from_pcm_s16le(&raw, 16000, 1)
    }
}

/// Counts archive calls; can fail every call or hold one room until released.
pub struct FakeArchive {
    calls: AtomicUsize,
    fail: bool,
    saw_existing_source: AtomicBool,
    rooms: Mutex<Vec<String>>,
    gate: Option<(String, Arc<Notify>)>,
    entered: Arc<Notify>,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
            saw_existing_source: AtomicBool::new(false),
            rooms: Mutex::new(Vec::new()),
            gate: None,
            entered: Arc::new(Notify::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    /// Archive calls for `room_id` wait until the returned `Notify` fires.
    pub fn gated(room_id: &str) -> (Self, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let archive = Self {
            gate: Some((room_id.to_string(), Arc::clone(&release))),
            ..Self::new()
        };
        (archive, release)
    }

    /// Resolves once a gated call has started waiting.
    pub async fn wait_until_gated(&self) {
        self.entered.notified().await;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn saw_existing_source(&self) -> bool {
        self.saw_existing_source.load(Ordering::SeqCst)
    }

    pub fn archived_rooms(&self) -> Vec<String> {
        self.rooms.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudioArchive for FakeArchive {
    async fn archive(
        &self,
        source: &Path,
        call_session_id: &str,
        participant_ids: &[String],
    ) -> Result<ArchivedAudioReference, ArchiveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if source.exists() {
            self.saw_existing_source.store(true, Ordering::SeqCst);
        }

        if let Some((room_id, release)) = &self.gate {
            if room_id == call_session_id {
                self.entered.notify_one();
                release.notified().await;
            }
        }

        if self.fail {
            return Err(ArchiveError::InvalidAudio("archive rejected the file".to_string()));
        }

        self.rooms.lock().unwrap().push(call_session_id.to_string());
        Ok(ArchivedAudioReference {
            file_id: format!("file-{}", call_session_id),
            file_path: source.display().to_string(),
            duration_seconds: 0.0,
            file_size_bytes: 0,
            format: "wav".to_string(),
            created_at: Utc::now(),
            call_session_id: call_session_id.to_string(),
            participant_ids: participant_ids.to_vec(),
        })
    }
}

/// Records every room it was notified about.
pub struct FakeCoordinator {
    fail: bool,
    notified: Mutex<Vec<String>>,
}

impl FakeCoordinator {
    pub fn new() -> Self {
        Self {
            fail: false,
            notified: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl DownstreamCoordinator for FakeCoordinator {
    async fn set_monitoring_reference(
        &self,
        room_id: &str,
        _reference: &ArchivedAudioReference,
    ) -> Result<(), NotifyError> {
        self.notified.lock().unwrap().push(room_id.to_string());
        if self.fail {
            return Err(NotifyError::Status {
                status: 503,
                body: "coordinator unavailable".to_string(),
            });
        }
        Ok(())
    }
}
