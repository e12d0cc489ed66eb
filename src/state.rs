//! # Application State
//!
//! Everything an HTTP or WebSocket handler needs, built once in `main` and
//! handed to actix as `web::Data<AppState>`.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: every actix worker thread holds a clone of `AppState`; the
//!   clones share one recording service and one archive
//! - **Cheap clones**: cloning an `Arc` copies a pointer, not the data
//!
//! ### Interior mutability lives below this struct
//! `AppState` itself is never mutated after startup. The registry, the
//! finalize counters and the archive index each guard their own data, so no
//! request ever waits on an application-wide lock.

use crate::archive::coordinator;
use crate::archive::storage::LocalAudioArchive;
use crate::audio::decoder::FfmpegDecoder;
use crate::config::AppConfig;
use crate::recording::service::RecordingService;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Loaded once at startup; read-only afterwards
    pub config: Arc<AppConfig>,

    /// The recording core: registry, finalizer and their collaborators
    pub recording: Arc<RecordingService>,

    /// Concrete archive, kept here so the HTTP surface can read its metadata
    pub archive: Arc<LocalAudioArchive>,

    /// When the server started
    pub start_time: Instant,
}

impl AppState {
    /// Build the production wiring from configuration.
    ///
    /// ## Components:
    /// - **Decoder**: `FfmpegDecoder`, scratch files in `<storage_path>/<temp_dir>`
    /// - **Archive**: `LocalAudioArchive` in `<storage_path>/<audio_dir>`
    /// - **Coordinator**: HTTP when `downstream.coordinator_url` is set, log-only otherwise
    pub fn new(config: AppConfig) -> Self {
        let archive = Arc::new(LocalAudioArchive::new(config.audio_path()));
        let recording = Arc::new(RecordingService::new(
            config.performance.max_rooms,
            config.temp_path(),
            Arc::new(FfmpegDecoder::new(&config.decoder, config.temp_path())),
            archive.clone(),
            coordinator::from_config(&config.downstream),
        ));

        Self {
            config: Arc::new(config),
            recording,
            archive,
            start_time: Instant::now(),
        }
    }

    /// Seconds since the server started.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_empty() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(state.recording.registry().room_count(), 0);
        assert_eq!(state.archive.archived_count(), 0);
        assert_eq!(state.config.server.port, 8003);
    }

    #[test]
    fn test_clones_share_the_recording_service() {
        let state = AppState::new(AppConfig::default());
        let clone = state.clone();
        assert!(Arc::ptr_eq(&state.recording, &clone.recording));
        assert!(state.get_uptime_seconds() < 5);
    }
}
