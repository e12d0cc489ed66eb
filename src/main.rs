//! # Audio Assurance Monitor - Main Application Entry Point
//!
//! Receives every participant's audio for a call over WebSocket, and when the
//! last participant of a room leaves, merges the streams into one reference
//! track, archives it and tells the downstream coordinator where it is.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: every connection and every finalize is an async task
//! - **modules**: the recording core, audio assembly and archive collaborators
//!   live in separate modules
//! - **Result<T, E>**: startup failures bubble up to `main` with `?`
//! - **Arc**: the recording service is shared by all workers
//! - **static**: the shutdown flag lives for the whole program
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML files + environment variables)
//! - **state**: Shared application state
//! - **health**: Health and metrics endpoints
//! - **handlers**: Read-only REST views of rooms and archived audio
//! - **websocket**: Audio ingestion transport
//! - **recording**: Room lifecycle and finalize
//! - **audio**: Decoding and merging participant streams
//! - **archive**: Durable archive and downstream coordinator
//! - **error**: Custom error types and HTTP error responses

mod archive;   // Durable archive and downstream coordinator (archive/ directory)
mod audio;     // Decode + merge (audio/ directory)
mod config;    // Configuration management (config.rs)
mod error;     // Error handling types (error.rs)
mod handlers;  // HTTP request handlers (handlers/ directory)
mod health;    // Health check endpoints (health.rs)
mod recording; // Room lifecycle core (recording/ directory)
mod state;     // Application state (state.rs)
mod websocket; // WebSocket ingestion (websocket.rs)

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once a SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from files and environment variables
/// 2. **Sets up logging**
/// 3. **Creates storage directories** for archived and transient audio
/// 4. **Wires the recording service** (decoder, archive, coordinator)
/// 5. **Runs the HTTP/WebSocket server** until a shutdown signal
/// 6. **Tears down the registry**, logging rooms that never finalized
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;
    config.initialize_storage()?;

    info!("Starting audio-assurance-monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        audio_dir = %config.audio_path().display(),
        temp_dir = %config.temp_path().display(),
        coordinator = config.downstream.coordinator_url.as_deref().unwrap_or("log-only"),
        max_rooms = config.performance.max_rooms,
        "Recording service configured"
    );

    let app_state = AppState::new(config.clone());
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server_state = app_state.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(server_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/rooms", web::get().to(handlers::list_rooms))
                    .route("/rooms/{room_id}", web::get().to(handlers::get_room))
                    .route("/archive/{file_id}", web::get().to(handlers::get_archived_audio)),
            )
            .route(
                "/ws/monitoring/{room_id}/{client_id}",
                web::get().to(websocket::monitoring_websocket),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    app_state.recording.shutdown();
    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g., "info", "audio_assurance_monitor=trace")
/// - If not set, defaults to "audio_assurance_monitor=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audio_assurance_monitor=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag on either.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
