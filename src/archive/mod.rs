//! # Archive Collaborators
//!
//! The two parties a finished room's audio is handed to:
//! - **storage**: the durable archive that keeps the merged track
//! - **coordinator**: the downstream service told where that track lives

pub mod coordinator;
pub mod storage;
