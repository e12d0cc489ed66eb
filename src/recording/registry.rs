//! # Session Registry
//!
//! Owns the room_id → room map. A room holds its stream handlers (in connect
//! order) and the one exclusion primitive that serializes its finalize with
//! every other disconnect and reconnect of the same room.
//!
//! ## Room Lifecycle:
//! 1. **Created** by the first `register` for a room_id (atomic get-or-create)
//! 2. **Active / Draining / Processing** while clients come and go
//! 3. **Closed** by its finalize, then removed from the map while the room
//!    lock is still held
//!
//! A room_id that connects again after removal starts a brand-new room with
//! a brand-new lock; a lock is never recreated for a room that is mid-finalize.
//!
//! ## Rust Concepts:
//! - **Arc<Room>**: the map, the finalizer and each connection share a room
//! - **Arc::ptr_eq**: identity checks so a stale room can never be mistaken
//!   for a newer room with the same id
//! - **tokio::sync::Mutex**: held across `.await` points while a room finalizes

use crate::error::RegistryError;
use crate::recording::handler::{HandlerSnapshot, StreamHandler};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Where a room is in its lifecycle.
///
/// ## State Transitions:
/// ```text
/// Active ──(last handler inactive)──> Draining ──(locked re-check passes)──> Processing ──> Closed
///    ^                                    │
///    └──────(reconnect / re-check fails)──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// At least one handler may still be active
    Active,
    /// Every handler looked inactive without the lock; eligibility pending
    Draining,
    /// Finalize is running under the room lock
    Processing,
    /// Finalize ran; terminal
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Draining => "draining",
            RoomStatus::Processing => "processing",
            RoomStatus::Closed => "closed",
        }
    }
}

/// One live room and its participant streams.
pub struct Room {
    room_id: String,
    handlers: RwLock<Vec<Arc<StreamHandler>>>,
    next_generation: AtomicU64,
    status: RwLock<RoomStatus>,
    /// Serializes finalize with concurrent disconnects and reconnects
    lock: tokio::sync::Mutex<()>,
    created_at: DateTime<Utc>,
}

/// Point-in-time view of a room for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room_id: String,
    pub state: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub handlers: Vec<HandlerSnapshot>,
}

impl Room {
    fn new(room_id: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            handlers: RwLock::new(Vec::new()),
            next_generation: AtomicU64::new(0),
            status: RwLock::new(RoomStatus::Active),
            lock: tokio::sync::Mutex::new(()),
            created_at: Utc::now(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Acquire the room lock.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.lock.lock().await
    }

    /// Create a handler with the next generation number and append it.
    fn add_handler(&self, client_id: &str) -> Arc<StreamHandler> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let handler = Arc::new(StreamHandler::new(&self.room_id, client_id, generation));
        self.write_handlers().push(Arc::clone(&handler));
        handler
    }

    /// Snapshot of the handler list, in connect order.
    pub fn handlers(&self) -> Vec<Arc<StreamHandler>> {
        self.read_handlers().clone()
    }

    pub fn contains(&self, handler: &Arc<StreamHandler>) -> bool {
        self.read_handlers().iter().any(|h| Arc::ptr_eq(h, handler))
    }

    /// True when the room has handlers and none of them is active.
    ///
    /// Reads only the handlers' atomic flags, so it is safe to call without
    /// the room lock (the finalizer's fast check).
    pub fn all_inactive(&self) -> bool {
        let handlers = self.read_handlers();
        !handlers.is_empty() && handlers.iter().all(|h| !h.is_active())
    }

    pub fn active_handlers(&self) -> usize {
        self.read_handlers().iter().filter(|h| h.is_active()).count()
    }

    /// Unique client ids in first-connect order.
    pub fn participant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for handler in self.read_handlers().iter() {
            if !ids.iter().any(|id| id == handler.client_id()) {
                ids.push(handler.client_id().to_string());
            }
        }
        ids
    }

    pub fn status(&self) -> RoomStatus {
        *self.status.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Active → Draining. Any other state is left alone.
    pub fn begin_draining(&self) {
        self.transition(&[RoomStatus::Active], RoomStatus::Draining);
    }

    /// Draining → Active, after a reconnect or a failed re-check.
    pub fn reactivate(&self) {
        self.transition(&[RoomStatus::Draining], RoomStatus::Active);
    }

    pub fn begin_processing(&self) {
        self.transition(&[RoomStatus::Active, RoomStatus::Draining], RoomStatus::Processing);
    }

    pub fn close(&self) {
        self.set_status(RoomStatus::Closed);
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.room_id.clone(),
            state: self.status(),
            created_at: self.created_at,
            handlers: self.read_handlers().iter().map(|h| h.snapshot()).collect(),
        }
    }

    fn transition(&self, from: &[RoomStatus], to: RoomStatus) {
        let mut status = self.status.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if from.contains(&*status) {
            debug!(room_id = %self.room_id, from = status.as_str(), to = to.as_str(), "Room state change");
            *status = to;
        }
    }

    fn set_status(&self, to: RoomStatus) {
        *self.status.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = to;
    }

    fn read_handlers(&self) -> RwLockReadGuard<'_, Vec<Arc<StreamHandler>>> {
        self.handlers.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_handlers(&self) -> RwLockWriteGuard<'_, Vec<Arc<StreamHandler>>> {
        self.handlers.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("room_id", &self.room_id)
            .field("status", &self.status())
            .field("handlers", &self.read_handlers().len())
            .finish()
    }
}

/// The room map. Created once at startup and shared as `Arc<SessionRegistry>`.
///
/// ## Thread Safety:
/// The map's `RwLock` is only ever held for a map operation, never across an
/// `.await`. Waiting happens on the per-room lock instead, so finalizes of
/// different rooms never contend.
pub struct SessionRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    max_rooms: usize,
}

impl SessionRegistry {
    pub fn new(max_rooms: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_rooms,
        }
    }

    /// Return the live room for `room_id`, creating it if absent.
    ///
    /// Lookup and insertion happen under one write lock, so concurrent first
    /// connects always end up sharing a single `Room` (and a single room lock).
    ///
    /// ## Errors:
    /// `RegistryError::RoomLimit` when creating the room would exceed `max_rooms`.
    /// Existing rooms are always returned.
    pub fn get_or_create(&self, room_id: &str) -> Result<Arc<Room>, RegistryError> {
        let mut rooms = self.write_rooms();
        let at_capacity = rooms.len() >= self.max_rooms;

        match rooms.entry(room_id.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                if at_capacity {
                    warn!(room_id = %room_id, max_rooms = self.max_rooms, "Refusing to create room, limit reached");
                    return Err(RegistryError::RoomLimit {
                        max_rooms: self.max_rooms,
                    });
                }
                let room = Arc::new(Room::new(room_id));
                entry.insert(Arc::clone(&room));
                info!(room_id = %room_id, "Created room");
                Ok(room)
            }
        }
    }

    pub fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.read_rooms().get(room_id).cloned()
    }

    /// Register a new stream handler for `client_id` in `room_id`.
    ///
    /// Always creates a new handler, even for a client_id already seen in the
    /// room; the generation number tells them apart. The insertion happens
    /// under the room lock, so it is ordered against any finalize. If the
    /// room finalized while this call waited for the lock, the call retries
    /// and lands in a fresh room.
    pub async fn register(
        &self,
        room_id: &str,
        client_id: &str,
    ) -> Result<Arc<StreamHandler>, RegistryError> {
        loop {
            let room = self.get_or_create(room_id)?;
            let _guard = room.lock().await;

            if room.status() == RoomStatus::Closed {
                debug!(room_id = %room_id, client_id = %client_id, "Room closed while waiting, retrying registration");
                continue;
            }

            let handler = room.add_handler(client_id);
            room.reactivate();
            info!(
                room_id = %room_id,
                client_id = %client_id,
                generation = handler.generation(),
                "Registered stream handler"
            );
            return Ok(handler);
        }
    }

    /// Mark `handler` inactive and return the room it belongs to.
    ///
    /// Returns `None` when the handler's room is no longer the live room for
    /// that id (it already finalized and was removed or replaced).
    pub fn unregister(&self, handler: &Arc<StreamHandler>) -> Option<Arc<Room>> {
        if !handler.mark_inactive() {
            debug!(
                room_id = %handler.room_id(),
                client_id = %handler.client_id(),
                generation = handler.generation(),
                "Handler already inactive"
            );
        }

        let room = self.get(handler.room_id())?;
        if room.contains(handler) {
            Some(room)
        } else {
            None
        }
    }

    /// Remove `room` from the map.
    ///
    /// Only removes the entry if it is this exact room, never a newer room
    /// that reuses the id. Called by the finalizer while it holds the room lock.
    pub fn remove(&self, room: &Arc<Room>) -> bool {
        let mut rooms = self.write_rooms();
        match rooms.get(room.room_id()) {
            Some(existing) if Arc::ptr_eq(existing, room) => {
                rooms.remove(room.room_id());
                info!(room_id = %room.room_id(), "Removed room from registry");
                true
            }
            _ => false,
        }
    }

    pub fn room_count(&self) -> usize {
        self.read_rooms().len()
    }

    pub fn active_stream_count(&self) -> usize {
        self.read_rooms().values().map(|room| room.active_handlers()).sum()
    }

    /// Snapshots of every live room, sorted by room_id.
    pub fn snapshot(&self) -> Vec<RoomSnapshot> {
        let rooms: Vec<Arc<Room>> = self.read_rooms().values().cloned().collect();
        let mut snapshots: Vec<RoomSnapshot> = rooms.iter().map(|room| room.snapshot()).collect();
        snapshots.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        snapshots
    }

    /// Drop every room that never finalized. Called once on process stop.
    ///
    /// Returns the number of rooms discarded.
    pub fn shutdown(&self) -> usize {
        let rooms: Vec<Arc<Room>> = self.write_rooms().drain().map(|(_, room)| room).collect();
        for room in &rooms {
            let handlers = room.handlers();
            warn!(
                room_id = %room.room_id(),
                state = room.status().as_str(),
                handlers = handlers.len(),
                buffered_bytes = handlers.iter().map(|h| h.total_bytes()).sum::<usize>(),
                "Discarding unfinalized room on shutdown"
            );
        }
        rooms.len()
    }

    fn read_rooms(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_rooms(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Room>>> {
        self.rooms.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
