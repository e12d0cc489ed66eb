//! # Recording Core
//!
//! Per-room session lifecycle: buffering participant streams, deciding when a
//! room is done, and handing its merged audio off exactly once.
//!
//! ## Key Components:
//! - **handler**: One participant connection's chunk buffer
//! - **registry**: The room map and each room's lock
//! - **finalizer**: Disconnect handling and the finalize decision
//! - **handoff**: Transient file, archive call, coordinator notification
//! - **service**: Ingestion entry point used by the transport
//!
//! ## Data Flow:
//! ```text
//! transport ──chunks──> StreamHandler
//!     │
//!     └─disconnect──> RoomFinalizer ──> AssemblyPipeline ──> ArchivalHandoff ──> registry.remove
//! ```

pub mod finalizer;
pub mod handler;
pub mod handoff;
pub mod registry;
pub mod service;

#[cfg(test)]
pub mod testing;
