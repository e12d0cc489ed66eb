//! # Audio Assembly
//!
//! Everything between "a participant's raw bytes" and "one merged track":
//!
//! ## Key Components:
//! - **Track**: Interleaved 16-bit PCM plus its format, and WAV encoding
//! - **Decoder**: The decode capability (`AudioDecoder`) and its ffmpeg implementation
//! - **Mixer**: Time-aligned additive overlay of decoded tracks
//! - **Pipeline**: Decode-all, drop failures, merge survivors
//!
//! ## Default Decoded Format:
//! - **Sample Rate**: 16kHz (configurable)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono (configurable)

pub mod decoder;      // Decode capability and ffmpeg implementation
pub mod mixer;        // Overlay merge
pub mod pipeline;     // Decode + merge for one room
pub mod track;        // Sample container and WAV encoding
