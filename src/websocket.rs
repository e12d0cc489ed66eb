//! # WebSocket Audio Ingestion
//!
//! Transport adapter between browser clients and the recording core.
//! Each participant connects to `/ws/monitoring/{room_id}/{client_id}` and
//! sends its encoded audio as binary frames.
//!
//! ## Connection Flow:
//! 1. **Register**: the handler is created before the upgrade, so a full
//!    registry answers with HTTP 503 instead of an upgraded socket
//! 2. **Stream**: the actor forwards every binary frame into a channel; the
//!    receiving half is the transport `RecordingService::ingest` consumes
//! 3. **Disconnect**: when the actor stops (close frame, protocol error or
//!    heartbeat timeout) the sender is dropped, the stream ends and the
//!    finalizer takes over
//!
//! ## Message Format:
//! - **Client → Server**: binary frames, opaque encoded audio (e.g. WebM/Opus)
//! - Text frames are ignored

use crate::error::AppError;
use crate::recording::finalizer::FinalizeOutcome;
use crate::state::AppState;
use actix::prelude::*;
use actix_web::{rt, web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

/// How often the server pings the client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// Silence longer than this ends the connection.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Why the transport stream ended with an error instead of a clean close.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    Protocol(String),
    HeartbeatTimeout,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Protocol(msg) => write!(f, "websocket protocol error: {}", msg),
            TransportError::HeartbeatTimeout => {
                write!(f, "no heartbeat for {}s", CLIENT_TIMEOUT.as_secs())
            }
        }
    }
}

type ChunkSender = mpsc::UnboundedSender<Result<Bytes, TransportError>>;

/// One participant's WebSocket connection.
///
/// ## Rust Concepts:
/// - **Actor**: actix runs `handle` for every frame on the connection's own task
/// - **Option<ChunkSender>**: taken in `stopped` so the ingest stream ends
///   exactly when the socket does
pub struct MonitoringWebSocket {
    room_id: String,
    client_id: String,
    generation: u64,
    sender: Option<ChunkSender>,
    last_heartbeat: Instant,
}

impl MonitoringWebSocket {
    pub fn new(room_id: &str, client_id: &str, generation: u64, sender: ChunkSender) -> Self {
        Self {
            room_id: room_id.to_string(),
            client_id: client_id.to_string(),
            generation,
            sender: Some(sender),
            last_heartbeat: Instant::now(),
        }
    }

    fn forward(&mut self, item: Result<Bytes, TransportError>) {
        if let Some(sender) = &self.sender {
            if sender.send(item).is_err() {
                // ingest already finished; nothing left to feed
                self.sender = None;
            }
        }
    }
}

impl Actor for MonitoringWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            room_id = %self.room_id,
            client_id = %self.client_id,
            generation = self.generation,
            "WebSocket connection started"
        );

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(room_id = %act.room_id, client_id = %act.client_id, "WebSocket heartbeat timeout, closing connection");
                act.forward(Err(TransportError::HeartbeatTimeout));
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(room_id = %self.room_id, client_id = %self.client_id, "WebSocket connection stopped");
        self.sender.take();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for MonitoringWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                self.forward(Ok(data));
            }
            Ok(ws::Message::Text(_)) => {
                debug!(room_id = %self.room_id, client_id = %self.client_id, "Ignoring text frame");
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(room_id = %self.room_id, client_id = %self.client_id, "WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(room_id = %self.room_id, client_id = %self.client_id, "Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(room_id = %self.room_id, client_id = %self.client_id, "WebSocket protocol error: {}", err);
                self.forward(Err(TransportError::Protocol(err.to_string())));
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// The participant is registered first. If the upgrade then fails, the
/// handler is disconnected straight away so the room is not left waiting on
/// a connection that never existed.
pub async fn monitoring_websocket(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (room_id, client_id) = path.into_inner();
    info!(
        room_id = %room_id,
        client_id = %client_id,
        "New WebSocket connection request from: {:?}",
        req.connection_info().peer_addr()
    );

    let handler = state
        .recording
        .connect(&room_id, &client_id)
        .await
        .map_err(AppError::from)?;

    let (sender, receiver) = mpsc::unbounded_channel();
    let actor = MonitoringWebSocket::new(&room_id, &client_id, handler.generation(), sender);

    match ws::start(actor, &req, stream) {
        Ok(response) => {
            let recording = Arc::clone(&state.recording);
            rt::spawn(async move {
                let outcome = recording
                    .ingest(handler, UnboundedReceiverStream::new(receiver))
                    .await;
                if let FinalizeOutcome::Archived(reference) = outcome {
                    info!(
                        room_id = %reference.call_session_id,
                        file_id = %reference.file_id,
                        participants = reference.participant_ids.len(),
                        "Last participant left, monitoring reference archived"
                    );
                }
            });
            Ok(response)
        }
        Err(e) => {
            warn!(room_id = %room_id, client_id = %client_id, error = %e, "WebSocket handshake failed");
            state.recording.disconnect(&handler).await;
            Err(e)
        }
    }
}
