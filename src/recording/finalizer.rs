//! # Room Finalizer
//!
//! Decides, on every disconnect, whether the room is finished, and if so runs
//! its one finalize: decode and merge, archive, notify, remove.
//!
//! ## Decision Sequence:
//! 1. Mark the disconnecting handler inactive
//! 2. **Fast check** without the lock: is every handler inactive? If not, stop
//! 3. Acquire the room lock
//! 4. **Re-check** under the lock: a reconnect or a concurrent finalize may
//!    have changed things while we waited
//! 5. Still finished: run the pipeline and the handoff under the lock, then
//!    remove the room, whatever the outcome
//!
//! Only the last of several racing disconnects ever reaches step 5, and a
//! room that reached it is closed, so a later waiter backs off at step 4.

use crate::archive::storage::ArchivedAudioReference;
use crate::audio::pipeline::AssemblyPipeline;
use crate::error::FinalizeError;
use crate::recording::handler::StreamHandler;
use crate::recording::handoff::ArchivalHandoff;
use crate::recording::registry::{Room, RoomStatus, SessionRegistry};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// What a single disconnect led to.
#[derive(Debug)]
pub enum FinalizeOutcome {
    /// The handler's room was already gone
    NotRegistered,
    /// Other handlers are still active
    RoomActive,
    /// Looked finished, but a reconnect won the race for the lock
    Reactivated,
    /// Another disconnect already finalized this room
    AlreadyFinalized,
    /// Finalize ran and the merged track was archived
    Archived(ArchivedAudioReference),
    /// Finalize ran and stopped early; the room is removed all the same
    Aborted,
}

/// Counters for the health and metrics endpoints.
#[derive(Debug, Default)]
pub struct FinalizeStats {
    archived: AtomicU64,
    no_audio: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeStatsSnapshot {
    pub rooms_archived: u64,
    pub rooms_without_audio: u64,
    pub rooms_failed: u64,
}

impl FinalizeStats {
    pub fn snapshot(&self) -> FinalizeStatsSnapshot {
        FinalizeStatsSnapshot {
            rooms_archived: self.archived.load(Ordering::Relaxed),
            rooms_without_audio: self.no_audio.load(Ordering::Relaxed),
            rooms_failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub struct RoomFinalizer {
    registry: Arc<SessionRegistry>,
    pipeline: AssemblyPipeline,
    handoff: ArchivalHandoff,
    stats: FinalizeStats,
}

impl RoomFinalizer {
    pub fn new(
        registry: Arc<SessionRegistry>,
        pipeline: AssemblyPipeline,
        handoff: ArchivalHandoff,
    ) -> Self {
        Self {
            registry,
            pipeline,
            handoff,
            stats: FinalizeStats::default(),
        }
    }

    pub fn stats(&self) -> FinalizeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Handle one participant connection ending, for any reason.
    ///
    /// Never returns an error: every failure inside a finalize is logged here
    /// and reported only through the outcome.
    pub async fn on_disconnect(&self, handler: &Arc<StreamHandler>) -> FinalizeOutcome {
        let Some(room) = self.registry.unregister(handler) else {
            debug!(
                room_id = %handler.room_id(),
                client_id = %handler.client_id(),
                "Disconnect for a room that is no longer registered"
            );
            return FinalizeOutcome::NotRegistered;
        };

        info!(
            room_id = %room.room_id(),
            client_id = %handler.client_id(),
            generation = handler.generation(),
            chunk_count = handler.chunk_count(),
            "Participant disconnected"
        );

        if !room.all_inactive() {
            return FinalizeOutcome::RoomActive;
        }

        room.begin_draining();
        let _guard = room.lock().await;

        if room.status() == RoomStatus::Closed {
            debug!(room_id = %room.room_id(), "Room already finalized");
            return FinalizeOutcome::AlreadyFinalized;
        }

        if !room.all_inactive() {
            room.reactivate();
            info!(room_id = %room.room_id(), "Participant reconnected before finalize, room stays active");
            return FinalizeOutcome::Reactivated;
        }

        room.begin_processing();
        let outcome = self.finalize(&room).await;
        room.close();
        self.registry.remove(&room);
        outcome
    }

    async fn finalize(&self, room: &Room) -> FinalizeOutcome {
        let started = Instant::now();
        let handlers = room.handlers();
        let participant_ids = room.participant_ids();

        info!(
            room_id = %room.room_id(),
            streams = handlers.len(),
            participants = participant_ids.len(),
            "All participants disconnected, finalizing room"
        );

        let result = self
            .assemble_and_hand_off(room.room_id(), &handlers, &participant_ids)
            .await;

        match result {
            Ok(reference) => {
                self.stats.archived.fetch_add(1, Ordering::Relaxed);
                info!(
                    room_id = %room.room_id(),
                    file_id = %reference.file_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Room finalized"
                );
                FinalizeOutcome::Archived(reference)
            }
            Err(FinalizeError::NoValidStreams { .. }) => {
                self.stats.no_audio.fetch_add(1, Ordering::Relaxed);
                FinalizeOutcome::Aborted
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    room_id = %room.room_id(),
                    participants = ?participant_ids,
                    error = %e,
                    "Room finalize failed, audio not archived"
                );
                FinalizeOutcome::Aborted
            }
        }
    }

    async fn assemble_and_hand_off(
        &self,
        room_id: &str,
        handlers: &[Arc<StreamHandler>],
        participant_ids: &[String],
    ) -> Result<ArchivedAudioReference, FinalizeError> {
        let merged = self.pipeline.assemble(room_id, handlers).await?;
        debug!(
            room_id = %room_id,
            contributors = ?merged.contributors,
            dropped_streams = merged.dropped,
            "Handing off merged track"
        );
        self.handoff.hand_off(room_id, &merged.track, participant_ids).await
    }
}
