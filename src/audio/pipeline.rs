//! # Audio Assembly Pipeline
//!
//! Runs once per room, at finalize time:
//! 1. **Decode** every participant stream through the decode capability
//! 2. **Drop** the streams that fail, logging each failure
//! 3. **Merge** the survivors by overlay into one reference track
//!
//! A room where nothing decodes produces no track at all.

use crate::audio::decoder::AudioDecoder;
use crate::audio::mixer;
use crate::audio::track::Track;
use crate::error::FinalizeError;
use crate::recording::handler::StreamHandler;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The combined track produced by one pipeline run.
///
/// Owned exclusively by the finalize run that created it.
#[derive(Debug)]
pub struct MergedTrack {
    pub track: Track,
    /// Streams that contributed, as `client_id#generation`
    pub contributors: Vec<String>,
    /// Streams that failed to decode
    pub dropped: usize,
}

/// Upper bound on streams of one room being decoded at the same time. Each
/// in-flight decode holds a full copy of its stream's bytes.
const MAX_CONCURRENT_DECODES: usize = 4;

pub struct AssemblyPipeline {
    decoder: Arc<dyn AudioDecoder>,
}

impl AssemblyPipeline {
    pub fn new(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { decoder }
    }

    /// Decode and merge a room's streams.
    ///
    /// ## Failure Handling:
    /// - One stream failing to decode is logged and that stream is skipped
    /// - Zero surviving streams returns `FinalizeError::NoValidStreams`
    ///
    /// Up to `MAX_CONCURRENT_DECODES` decodes run at once; a stream's bytes
    /// are only copied out of its handler when its decode starts. A single
    /// survivor still goes through the merge step.
    pub async fn assemble(
        &self,
        room_id: &str,
        handlers: &[Arc<StreamHandler>],
    ) -> Result<MergedTrack, FinalizeError> {
        let results: Vec<_> = stream::iter(handlers.iter().cloned())
            .map(|handler| {
                let decoder = Arc::clone(&self.decoder);
                async move { decoder.decode(handler.get_full_stream()).await }
            })
            .buffered(MAX_CONCURRENT_DECODES)
            .collect()
            .await;

        let mut tracks = Vec::new();
        let mut contributors = Vec::new();
        let mut dropped = 0;

        for (handler, result) in handlers.iter().zip(results) {
            match result {
                Ok(track) => {
                    contributors.push(handler.label());
                    tracks.push(track);
                }
                Err(e) => {
                    dropped += 1;
                    error!(
                        room_id = %room_id,
                        client_id = %handler.client_id(),
                        generation = handler.generation(),
                        chunk_count = handler.chunk_count(),
                        error = %e,
                        "Failed to decode participant stream, dropping it"
                    );
                }
            }
        }

        let Some(track) = mixer::overlay(tracks) else {
            warn!(
                room_id = %room_id,
                streams = handlers.len(),
                "No valid audio received in room, no reference track will be created"
            );
            return Err(FinalizeError::NoValidStreams {
                attempted: handlers.len(),
            });
        };

        info!(
            room_id = %room_id,
            merged_streams = contributors.len(),
            dropped_streams = dropped,
            duration_secs = track.duration_seconds(),
            "Merged participant streams"
        );

        Ok(MergedTrack {
            track,
            contributors,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::AudioDecoder;
    use crate::audio::track::Track;
    use crate::error::DecodeError;
    use crate::recording::testing::{pcm_bytes, ScriptedDecoder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records the most decodes it ever saw in flight at once.
    #[derive(Default)]
    struct CountingDecoder {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AudioDecoder for CountingDecoder {
        async fn decode(&self, raw: Vec<u8>) -> Result<Track, DecodeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Track::new(16000, 1, vec![raw.len() as i16]))
        }
    }

    fn handler_with(client_id: &str, generation: u64, chunks: &[&[u8]]) -> Arc<StreamHandler> {
        let handler = Arc::new(StreamHandler::new("room-1", client_id, generation));
        for chunk in chunks {
            handler.add_chunk(bytes::Bytes::copy_from_slice(chunk));
        }
        handler
    }

    #[tokio::test]
    async fn test_merges_all_decoded_streams() {
        let pipeline = AssemblyPipeline::new(Arc::new(ScriptedDecoder::new()));
        let a = pcm_bytes(&[100, 100]);
        let b = pcm_bytes(&[1, 2]);
        let handlers = vec![handler_with("alice", 0, &[&a]), handler_with("bob", 1, &[&b])];

        let merged = pipeline.assemble("room-1", &handlers).await.unwrap();
        assert_eq!(merged.track.samples, vec![101, 102]);
        assert_eq!(merged.contributors, vec!["alice#0", "bob#1"]);
        assert_eq!(merged.dropped, 0);
    }

    #[tokio::test]
    async fn test_single_survivor_still_produces_track() {
        let decoder = Arc::new(ScriptedDecoder::new());
        let pipeline = AssemblyPipeline::new(decoder.clone());
        let good = pcm_bytes(&[7, 8, 9]);
        let handlers = vec![
            handler_with("alice", 0, &[b"corrupt"]),
            handler_with("bob", 1, &[&good]),
            handler_with("carol", 2, &[]),
        ];

        let merged = pipeline.assemble("room-1", &handlers).await.unwrap();
        assert_eq!(merged.track.samples, vec![7, 8, 9]);
        assert_eq!(merged.contributors, vec!["bob#1"]);
        assert_eq!(merged.dropped, 2);
        assert_eq!(decoder.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_valid_streams_is_an_error() {
        let pipeline = AssemblyPipeline::new(Arc::new(ScriptedDecoder::new()));
        let handlers = vec![
            handler_with("alice", 0, &[b"corrupt"]),
            handler_with("bob", 1, &[]),
        ];

        let result = pipeline.assemble("room-1", &handlers).await;
        assert!(matches!(
            result,
            Err(FinalizeError::NoValidStreams { attempted: 2 })
        ));
    }

    #[tokio::test]
    async fn test_decodes_are_bounded_and_keep_handler_order() {
        let decoder = Arc::new(CountingDecoder::default());
        let pipeline = AssemblyPipeline::new(decoder.clone());
        let handlers: Vec<_> = (0..10)
            .map(|i| handler_with(&format!("client-{}", i), i as u64, &[&vec![0u8; i + 1]]))
            .collect();

        let merged = pipeline.assemble("room-1", &handlers).await.unwrap();

        assert_eq!(decoder.calls.load(Ordering::SeqCst), 10);
        assert!(decoder.peak.load(Ordering::SeqCst) <= MAX_CONCURRENT_DECODES);
        assert_eq!(merged.contributors[0], "client-0#0");
        assert_eq!(merged.contributors[9], "client-9#9");
        // 1 + 2 + ... + 10 bytes
        assert_eq!(merged.track.samples, vec![55]);
    }
}
