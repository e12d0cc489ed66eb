//! # Recording Service
//!
//! The ingestion entry point the transport talks to. A connection is:
//! 1. `connect`: register a new stream handler in the room
//! 2. `ingest`: pull chunks from the transport until it closes or errors
//! 3. disconnect: hand the handler to the finalizer
//!
//! The transport is any `Stream` of byte chunks, so the WebSocket adapter and
//! the tests drive exactly the same code.

use crate::archive::coordinator::DownstreamCoordinator;
use crate::archive::storage::AudioArchive;
use crate::audio::decoder::AudioDecoder;
use crate::audio::pipeline::AssemblyPipeline;
use crate::error::RegistryError;
use crate::recording::finalizer::{FinalizeOutcome, FinalizeStatsSnapshot, RoomFinalizer};
use crate::recording::handler::StreamHandler;
use crate::recording::handoff::ArchivalHandoff;
use crate::recording::registry::SessionRegistry;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RecordingService {
    registry: Arc<SessionRegistry>,
    finalizer: RoomFinalizer,
}

impl RecordingService {
    /// Wire the registry, pipeline and handoff together.
    pub fn new(
        max_rooms: usize,
        temp_dir: impl Into<PathBuf>,
        decoder: Arc<dyn AudioDecoder>,
        archive: Arc<dyn AudioArchive>,
        coordinator: Arc<dyn DownstreamCoordinator>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(max_rooms));
        let finalizer = RoomFinalizer::new(
            Arc::clone(&registry),
            AssemblyPipeline::new(decoder),
            ArchivalHandoff::new(temp_dir, archive, coordinator),
        );
        Self {
            registry,
            finalizer,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> FinalizeStatsSnapshot {
        self.finalizer.stats()
    }

    /// Register a new participant connection.
    ///
    /// Transports call this before streaming starts, so a refused room can
    /// still be answered at the protocol level.
    pub async fn connect(
        &self,
        room_id: &str,
        client_id: &str,
    ) -> Result<Arc<StreamHandler>, RegistryError> {
        let handler = self.registry.register(room_id, client_id).await?;
        info!(
            room_id = %room_id,
            client_id = %client_id,
            generation = handler.generation(),
            "Participant connected"
        );
        Ok(handler)
    }

    /// Buffer every chunk the transport yields, then run the disconnect path.
    ///
    /// A clean close and a transport error end the connection the same way;
    /// the error is only logged. Empty chunks are skipped.
    pub async fn ingest<S, E>(&self, handler: Arc<StreamHandler>, mut transport: S) -> FinalizeOutcome
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        while let Some(item) = transport.next().await {
            match item {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => {
                    if !handler.add_chunk(chunk) {
                        debug!(
                            room_id = %handler.room_id(),
                            client_id = %handler.client_id(),
                            "Dropping chunk for inactive handler"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        room_id = %handler.room_id(),
                        client_id = %handler.client_id(),
                        error = %e,
                        "Transport error, treating as disconnect"
                    );
                    break;
                }
            }
        }

        self.disconnect(&handler).await
    }

    pub async fn disconnect(&self, handler: &Arc<StreamHandler>) -> FinalizeOutcome {
        self.finalizer.on_disconnect(handler).await
    }

    /// Discard rooms that never finalized. Called on process stop.
    pub fn shutdown(&self) -> usize {
        let discarded = self.registry.shutdown();
        info!(discarded_rooms = discarded, "Recording service stopped");
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::testing::{pcm_bytes, FakeArchive, FakeCoordinator, ScriptedDecoder};
    use futures_util::stream;

    fn service(max_rooms: usize, temp_dir: &std::path::Path, archive: Arc<FakeArchive>) -> RecordingService {
        RecordingService::new(
            max_rooms,
            temp_dir,
            Arc::new(ScriptedDecoder::new()),
            archive,
            Arc::new(FakeCoordinator::new()),
        )
    }

    fn chunks(items: Vec<Result<Bytes, String>>) -> impl Stream<Item = Result<Bytes, String>> + Unpin {
        stream::iter(items)
    }

    #[tokio::test]
    async fn test_single_participant_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive::new());
        let service = service(4, dir.path(), archive.clone());

        let transport = chunks(vec![
            Ok(Bytes::from(pcm_bytes(&[1, 2]))),
            Ok(Bytes::new()),
            Ok(Bytes::from(pcm_bytes(&[3]))),
        ]);
        let handler = service.connect("room-1", "alice").await.unwrap();
        let outcome = service.ingest(handler, transport).await;

        match outcome {
            FinalizeOutcome::Archived(reference) => assert_eq!(reference.participant_ids, vec!["alice"]),
            other => panic!("expected archive, got {:?}", other),
        }
        assert_eq!(service.registry().room_count(), 0);
        assert_eq!(service.stats().rooms_archived, 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_a_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive::new());
        let service = service(4, dir.path(), archive.clone());

        let handler = service.connect("room-1", "alice").await.unwrap();
        let transport = chunks(vec![
            Ok(Bytes::from(pcm_bytes(&[7, 7]))),
            Err("connection reset".to_string()),
            Ok(Bytes::from(pcm_bytes(&[9]))),
        ]);
        let outcome = service.ingest(Arc::clone(&handler), transport).await;

        assert!(matches!(outcome, FinalizeOutcome::Archived(_)));
        assert_eq!(handler.chunk_count(), 1);
        assert!(!handler.is_active());
    }

    #[tokio::test]
    async fn test_first_of_two_participants_leaves_room_active() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive::new());
        let service = service(4, dir.path(), archive.clone());

        let bob = service.connect("room-1", "bob").await.unwrap();
        let alice = service.connect("room-1", "alice").await.unwrap();
        let outcome = service
            .ingest(alice, chunks(vec![Ok(Bytes::from(pcm_bytes(&[1])))]))
            .await;

        assert!(matches!(outcome, FinalizeOutcome::RoomActive));
        assert_eq!(archive.calls(), 0);
        assert!(bob.is_active());
        assert_eq!(service.registry().room_count(), 1);
    }

    #[tokio::test]
    async fn test_room_limit_rejects_connect() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(1, dir.path(), Arc::new(FakeArchive::new()));

        service.connect("room-1", "alice").await.unwrap();
        let result = service.connect("room-2", "bob").await;
        assert!(matches!(result, Err(RegistryError::RoomLimit { max_rooms: 1 })));
        // joining a live room is still allowed at the limit
        assert!(service.connect("room-1", "carol").await.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_discards_open_rooms() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(FakeArchive::new());
        let service = service(4, dir.path(), archive.clone());

        service.connect("room-1", "alice").await.unwrap();
        assert_eq!(service.shutdown(), 1);
        assert_eq!(archive.calls(), 0);
    }
}
