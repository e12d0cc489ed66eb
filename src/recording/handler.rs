//! # Stream Handler
//!
//! Buffers one participant connection's raw audio chunks, in arrival order,
//! until the room finalizes.
//!
//! ## Lifecycle:
//! 1. **Active**: created on connect, accepts chunks
//! 2. **Inactive**: flipped exactly once on disconnect; further chunks are ignored
//! 3. Retained (inactive) until its room finalizes, then dropped with the room

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Per-(room, client, generation) chunk buffer.
///
/// ## Thread Safety:
/// `active` is an atomic so the finalizer's unlocked "is everyone gone?" scan
/// never blocks on a connection. The chunk buffer and the flag are changed
/// together under `buffer`'s mutex so no chunk can land after the flip.
pub struct StreamHandler {
    room_id: String,
    client_id: String,
    /// Distinguishes reconnects of the same client_id within a room
    generation: u64,
    active: AtomicBool,
    buffer: Mutex<ChunkBuffer>,
    connected_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ChunkBuffer {
    chunks: Vec<Bytes>,
    chunk_count: usize,
    total_bytes: usize,
}

/// Point-in-time view of a handler for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerSnapshot {
    pub client_id: String,
    pub generation: u64,
    pub active: bool,
    pub chunk_count: usize,
    pub total_bytes: usize,
    pub connected_at: DateTime<Utc>,
}

impl StreamHandler {
    pub fn new(room_id: &str, client_id: &str, generation: u64) -> Self {
        Self {
            room_id: room_id.to_string(),
            client_id: client_id.to_string(),
            generation,
            active: AtomicBool::new(true),
            buffer: Mutex::new(ChunkBuffer::default()),
            connected_at: Utc::now(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// `client_id#generation`, used in logs and merge reports.
    pub fn label(&self) -> String {
        format!("{}#{}", self.client_id, self.generation)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Append a chunk if the handler is still active.
    ///
    /// Returns whether the chunk was accepted. No size or duration cap is
    /// enforced here.
    pub fn add_chunk(&self, chunk: Bytes) -> bool {
        let mut buffer = self.lock_buffer();
        if !self.is_active() {
            return false;
        }
        buffer.total_bytes += chunk.len();
        buffer.chunk_count += 1;
        buffer.chunks.push(chunk);
        true
    }

    /// Concatenation of every accepted chunk, in arrival order.
    pub fn get_full_stream(&self) -> Vec<u8> {
        let buffer = self.lock_buffer();
        let mut stream = Vec::with_capacity(buffer.total_bytes);
        for chunk in &buffer.chunks {
            stream.extend_from_slice(chunk);
        }
        stream
    }

    /// Flip active → inactive.
    ///
    /// Idempotent: returns `true` only for the call that performed the transition.
    pub fn mark_inactive(&self) -> bool {
        let _buffer = self.lock_buffer();
        self.active.swap(false, Ordering::AcqRel)
    }

    pub fn chunk_count(&self) -> usize {
        self.lock_buffer().chunk_count
    }

    pub fn total_bytes(&self) -> usize {
        self.lock_buffer().total_bytes
    }

    pub fn snapshot(&self) -> HandlerSnapshot {
        let buffer = self.lock_buffer();
        HandlerSnapshot {
            client_id: self.client_id.clone(),
            generation: self.generation,
            active: self.is_active(),
            chunk_count: buffer.chunk_count,
            total_bytes: buffer.total_bytes,
            connected_at: self.connected_at,
        }
    }

    // Every mutation is a push or an integer add, so a poisoned buffer is still consistent.
    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, ChunkBuffer> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for StreamHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandler")
            .field("room_id", &self.room_id)
            .field("client_id", &self.client_id)
            .field("generation", &self.generation)
            .field("active", &self.is_active())
            .finish()
    }
}
