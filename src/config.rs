//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_STORAGE__TEMP_DIR, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each group maps to one collaborator of the recording core: where files
/// live (storage), how raw streams are decoded (decoder), who is told about
/// archived audio (downstream) and how much the registry admits (performance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub decoder: DecoderConfig,
    pub downstream: DownstreamConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Filesystem locations.
///
/// ## Fields:
/// - `storage_path`: Root of everything this service writes
/// - `audio_dir`: Permanent archive directory (relative to `storage_path`)
/// - `temp_dir`: Transient merged tracks live here until the archive copies them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub storage_path: String,
    pub audio_dir: String,
    pub temp_dir: String,
}

/// External decoder settings.
///
/// Streams are decoded to 16-bit PCM at their native sample rate and channel
/// count; only the binary and its time limit are configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub ffmpeg_path: String,
    pub timeout_secs: u64,
}

/// Downstream coordinator settings.
///
/// When `coordinator_url` is absent the archived reference is only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    pub coordinator_url: Option<String>,
    pub timeout_secs: u64,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_rooms`: Upper bound on live rooms. Joining an existing room is
///   always allowed; only creating room number `max_rooms + 1` is refused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_rooms: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8003,
            },
            storage: StorageConfig {
                storage_path: "storage_system2".to_string(),
                audio_dir: "audio".to_string(),
                temp_dir: "tmp".to_string(),
            },
            decoder: DecoderConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                timeout_secs: 60,
            },
            downstream: DownstreamConfig {
                coordinator_url: None,
                timeout_secs: 10,
            },
            performance: PerformanceConfig { max_rooms: 256 },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_DOWNSTREAM__COORDINATOR_URL=http://localhost:8005`: Enable HTTP notification
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - A decoder binary is named
    /// - Timeouts are non-zero
    /// - The coordinator URL, if any, is an http(s) URL
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.decoder.ffmpeg_path.trim().is_empty() {
            return Err(anyhow::anyhow!("Decoder ffmpeg_path cannot be empty"));
        }

        if self.decoder.timeout_secs == 0 || self.downstream.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0"));
        }

        if self.performance.max_rooms == 0 {
            return Err(anyhow::anyhow!("Max rooms must be greater than 0"));
        }

        if let Some(url) = &self.downstream.coordinator_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!(
                    "Coordinator URL must start with http:// or https://, got '{}'",
                    url
                ));
            }
        }

        Ok(())
    }

    /// Permanent archive directory.
    pub fn audio_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.storage_path).join(&self.storage.audio_dir)
    }

    /// Directory for transient merged tracks.
    pub fn temp_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.storage_path).join(&self.storage.temp_dir)
    }

    /// Create every directory the service writes into.
    pub fn initialize_storage(&self) -> Result<()> {
        std::fs::create_dir_all(self.audio_path())?;
        std::fs::create_dir_all(self.temp_path())?;
        Ok(())
    }
}
