//! # Error Handling
//!
//! Two families of errors live here:
//!
//! - **AppError**: what the HTTP surface returns to API clients. It implements
//!   `ResponseError` so handlers can use `?` and still produce a JSON body.
//! - **Recording errors** (`DecodeError`, `ArchiveError`, `NotifyError`,
//!   `FinalizeError`): failures inside a room's finalize run. These are logged
//!   by the finalizer and never leave the recording core as return values.
//!
//! ## Key Rust Concepts:
//! - **enum variants with data**: each failure carries the context needed to log it
//! - **Display trait**: one place that decides how an error reads in the logs
//! - **From trait**: lets `?` convert lower-level errors automatically

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Errors returned by the HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: Server-side problems (500 errors)
/// - **NotFound**: Requested room or archive entry doesn't exist (404 errors)
/// - **ConfigError**: Configuration problems (500 errors)
/// - **Unavailable**: The service is at capacity (503 errors)
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    NotFound(String),
    ConfigError(String),
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts an `AppError` into a JSON HTTP response.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "not_found",
///     "message": "Archived audio 'abc' not found",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::Internal(msg) => ("internal_error", msg),
            AppError::NotFound(msg) => ("not_found", msg),
            AppError::ConfigError(msg) => ("config_error", msg),
            AppError::Unavailable(msg) => ("unavailable", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// `?` on an anyhow error inside a handler becomes a 500.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Configuration loading can fail for missing files, bad TOML syntax
/// or values that don't deserialize into `AppConfig`.
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;

/// Failure to turn one participant's raw bytes into samples.
///
/// ## Recovery:
/// A decode failure only drops that participant's stream. The room still
/// finalizes as long as one other stream decoded.
#[derive(Debug)]
pub enum DecodeError {
    /// The participant never sent a single byte
    EmptyInput,
    /// The decoder process could not be started
    Spawn(std::io::Error),
    /// Writing to or reading from the decoder failed
    Io(std::io::Error),
    /// The decoder exited with a non-zero status
    ProcessFailed { status: Option<i32>, stderr: String },
    /// The decoder succeeded but its output is not usable PCM
    MalformedOutput(String),
    /// The decoder did not finish within the configured timeout
    Timeout(u64),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::EmptyInput => write!(f, "stream contains no audio bytes"),
            DecodeError::Spawn(e) => write!(f, "failed to start decoder: {}", e),
            DecodeError::Io(e) => write!(f, "decoder I/O error: {}", e),
            DecodeError::ProcessFailed { status, stderr } => match status {
                Some(code) => write!(f, "decoder exited with status {}: {}", code, stderr.trim()),
                None => write!(f, "decoder terminated by signal: {}", stderr.trim()),
            },
            DecodeError::MalformedOutput(msg) => write!(f, "malformed decoder output: {}", msg),
            DecodeError::Timeout(secs) => write!(f, "decoder timed out after {}s", secs),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Spawn(e) | DecodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Failure reported by the durable archive.
#[derive(Debug)]
pub enum ArchiveError {
    /// The transient file handed to the archive no longer exists
    SourceMissing(std::path::PathBuf),
    Io(std::io::Error),
    /// The archive rejected the audio payload itself
    InvalidAudio(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::SourceMissing(path) => {
                write!(f, "cannot archive: source audio {} does not exist", path.display())
            }
            ArchiveError::Io(e) => write!(f, "archive I/O error: {}", e),
            ArchiveError::InvalidAudio(msg) => write!(f, "invalid audio for archive: {}", msg),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ArchiveError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ArchiveError {
    fn from(err: std::io::Error) -> Self {
        ArchiveError::Io(err)
    }
}

/// Failure to hand an archived reference to the downstream coordinator.
/// Logged at the call site, never alters the finalize control flow.
#[derive(Debug)]
pub enum NotifyError {
    Request(String),
    Status { status: u16, body: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Request(msg) => write!(f, "could not reach downstream coordinator: {}", msg),
            NotifyError::Status { status, body } => {
                write!(f, "downstream coordinator responded {}: {}", status, body)
            }
        }
    }
}

impl std::error::Error for NotifyError {}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::Request(err.to_string())
    }
}

/// Rejections from the session registry when a client connects.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Creating another room would exceed `performance.max_rooms`
    RoomLimit { max_rooms: usize },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::RoomLimit { max_rooms } => {
                write!(f, "room limit reached ({} live rooms)", max_rooms)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

/// Reasons a room's finalize run stops before the handoff completes.
#[derive(Debug)]
pub enum FinalizeError {
    /// Every participant stream failed to decode
    NoValidStreams { attempted: usize },
    /// Writing the merged track to the transient file failed
    Encode(std::io::Error),
    Archive(ArchiveError),
}

impl fmt::Display for FinalizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeError::NoValidStreams { attempted } => {
                write!(f, "none of {} participant streams decoded", attempted)
            }
            FinalizeError::Encode(e) => write!(f, "failed to write merged track: {}", e),
            FinalizeError::Archive(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for FinalizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FinalizeError::Encode(e) => Some(e),
            FinalizeError::Archive(e) => Some(e),
            FinalizeError::NoValidStreams { .. } => None,
        }
    }
}

impl From<ArchiveError> for FinalizeError {
    fn from(err: ArchiveError) -> Self {
        FinalizeError::Archive(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Internal("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            AppError::ConfigError("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let limit: AppError = RegistryError::RoomLimit { max_rooms: 2 }.into();
        assert_eq!(limit.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::ProcessFailed {
            status: Some(1),
            stderr: "pipe:0: Invalid data found\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "decoder exited with status 1: pipe:0: Invalid data found"
        );
        assert_eq!(DecodeError::Timeout(5).to_string(), "decoder timed out after 5s");
    }

    #[test]
    fn test_finalize_error_wraps_archive_error() {
        let err: FinalizeError = ArchiveError::InvalidAudio("empty".into()).into();
        assert!(matches!(err, FinalizeError::Archive(_)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
