//! WebSocket transport on `/ws/hololens`.
//!
//! Every text frame is one JSON packet. Device readings
//! (`{"device_id", "sensor_data"}`) go through the same ingestion path as
//! HTTP and are acknowledged; chunk packets are buffered until complete and
//! then routed like a single frame; any other JSON is echoed back verbatim.
//! Undecodable frames are reported to the sender and the session carries on.

use std::fmt::Display;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunks::{ChunkAssembler, ChunkLimits, ChunkPacket, ChunkProgress};
use crate::errors::Error;
use crate::ingest::{Ingestor, Transport};
use crate::metrics::{ECHOED_FRAMES_TOTAL, MALFORMED_FRAMES_TOTAL, WS_SESSIONS_ACTIVE};
use crate::model::Reading;
use crate::rest::AppState;

pub const RECEIVED_STATUS: &str = "Data received successfully";

/// Server → device messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A reading was stored.
    Ack { device_id: String, status: String },

    /// A chunk was buffered; the packet is still incomplete.
    Chunk {
        packet_id: String,
        received: u32,
        total_chunks: u32,
    },

    Error { code: ErrorCode, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MalformedFrame,
    ValidationFailed,
    InvalidChunk,
    UnsupportedFrame,
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    fn from_error(e: &Error) -> Self {
        let code = match e {
            e if e.is_validation() => ErrorCode::ValidationFailed,
            Error::InvalidChunk(_) => ErrorCode::InvalidChunk,
            _ => ErrorCode::MalformedFrame,
        };
        Self::error(code, e.to_string())
    }
}

/// What to send back for one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Message(ServerMessage),
    Echo(String),
}

impl Reply {
    pub fn into_text(self) -> String {
        match self {
            Reply::Echo(text) => text,
            Reply::Message(msg) => serde_json::to_string(&msg).unwrap_or_else(|e| {
                error!("Failed to serialize reply: {}", e);
                r#"{"type":"error","code":"MALFORMED_FRAME","message":"reply encoding failed"}"#
                    .to_string()
            }),
        }
    }
}

/// Shape-based classification of a decoded frame.
#[derive(Debug)]
enum Packet {
    Reading(Reading),
    Chunk(ChunkPacket),
    Opaque,
}

fn classify(value: &Value) -> Result<Packet, Error> {
    let Some(object) = value.as_object() else {
        return Ok(Packet::Opaque);
    };

    let is_reading = object.get("device_id").is_some_and(Value::is_string)
        && object.get("sensor_data").is_some_and(Value::is_object);
    if is_reading {
        return serde_json::from_value(value.clone())
            .map(Packet::Reading)
            .map_err(|e| Error::MalformedFrame(e.to_string()));
    }

    let is_chunk = object.get("packetId").is_some_and(Value::is_string)
        && object.get("chunk").is_some_and(Value::is_object);
    if is_chunk {
        return serde_json::from_value(value.clone())
            .map(Packet::Chunk)
            .map_err(|e| Error::InvalidChunk(e.to_string()));
    }

    Ok(Packet::Opaque)
}

/// Per-connection dispatcher from frames to replies.
#[derive(Debug)]
pub struct PacketRouter {
    session_id: String,
    ingestor: Ingestor,
    assembler: ChunkAssembler,
}

impl PacketRouter {
    pub fn new(session_id: impl Into<String>, ingestor: Ingestor, limits: ChunkLimits) -> Self {
        Self {
            session_id: session_id.into(),
            ingestor,
            assembler: ChunkAssembler::new(limits),
        }
    }

    pub fn route_text(&mut self, text: &str) -> Reply {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => return self.reject(Error::MalformedFrame(e.to_string())),
        };

        match classify(&value) {
            Ok(Packet::Reading(reading)) => self.store(reading),
            Ok(Packet::Chunk(packet)) => self.buffer(packet),
            Ok(Packet::Opaque) => self.echo(text.to_string()),
            Err(e) => self.reject(e),
        }
    }

    fn store(&self, reading: Reading) -> Reply {
        let device_id = reading.device_id.clone();
        match self.ingestor.ingest(reading, Transport::WebSocket) {
            Ok(()) => Reply::Message(ServerMessage::Ack {
                device_id,
                status: RECEIVED_STATUS.to_string(),
            }),
            Err(e) => self.reject(e),
        }
    }

    fn buffer(&mut self, packet: ChunkPacket) -> Reply {
        let packet_id = packet.packet_id.clone();
        match self.assembler.accept(packet) {
            Ok(ChunkProgress::Partial { received, total }) => Reply::Message(ServerMessage::Chunk {
                packet_id,
                received,
                total_chunks: total,
            }),
            Ok(ChunkProgress::Complete(assembled)) => {
                debug!(
                    "[{}] Packet {} ({}) assembled, {} bytes",
                    self.session_id,
                    assembled.packet_id,
                    assembled.packet_type.as_deref().unwrap_or("untyped"),
                    assembled.data.len()
                );
                self.route_assembled(assembled.data)
            }
            Err(e) => self.reject(e),
        }
    }

    /// Routes a reassembled payload. Chunk packets nested inside one are not
    /// unwrapped again and come back as an echo.
    fn route_assembled(&mut self, data: String) -> Reply {
        let value: Value = match serde_json::from_str(&data) {
            Ok(v) => v,
            Err(e) => return self.reject(Error::MalformedFrame(e.to_string())),
        };
        match classify(&value) {
            Ok(Packet::Reading(reading)) => self.store(reading),
            Ok(Packet::Chunk(_)) | Ok(Packet::Opaque) => self.echo(data),
            Err(e) => self.reject(e),
        }
    }

    fn echo(&self, text: String) -> Reply {
        ECHOED_FRAMES_TOTAL.inc();
        debug!("[{}] Echoing {} bytes", self.session_id, text.len());
        Reply::Echo(text)
    }

    fn reject(&self, e: Error) -> Reply {
        if matches!(e, Error::MalformedFrame(_)) {
            MALFORMED_FRAMES_TOTAL.inc();
        }
        warn!("[{}] Frame rejected: {}", self.session_id, e);
        Reply::Message(ServerMessage::from_error(&e))
    }
}

/// One WebSocket connection, from accept to disconnect.
pub struct WsSession {
    id: String,
    router: PacketRouter,
    idle_timeout: Duration,
}

impl WsSession {
    pub fn new(ingestor: Ingestor, idle_timeout: Duration, chunk_limits: ChunkLimits) -> Self {
        let id = Uuid::new_v4().to_string()[..8].to_string();
        info!("[{}] New session", id);
        Self {
            router: PacketRouter::new(id.clone(), ingestor, chunk_limits),
            id,
            idle_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Processes frames until the peer closes, the transport fails or the
    /// session sits idle for longer than the idle timeout.
    pub async fn run<R, W, E>(mut self, mut incoming: R, mut outgoing: W)
    where
        R: Stream<Item = Result<Message, E>> + Unpin,
        W: Sink<Message> + Unpin,
        W::Error: Display,
        E: Display,
    {
        loop {
            let next = match tokio::time::timeout(self.idle_timeout, incoming.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!("[{}] Idle for {:?}, closing", self.id, self.idle_timeout);
                    let _ = outgoing.send(Message::Close(None)).await;
                    break;
                }
            };

            let reply = match next {
                Some(Ok(Message::Text(text))) => Some(self.router.route_text(&text)),
                Some(Ok(Message::Binary(_))) => {
                    warn!("[{}] Binary frames are not supported", self.id);
                    Some(Reply::Message(ServerMessage::error(
                        ErrorCode::UnsupportedFrame,
                        "binary frames are not supported",
                    )))
                }
                Some(Ok(Message::Close(_))) => {
                    info!("[{}] Client closed connection", self.id);
                    break;
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => None,
                Some(Err(e)) => {
                    error!("[{}] WebSocket error: {}", self.id, e);
                    break;
                }
                None => {
                    info!("[{}] Stream ended", self.id);
                    break;
                }
            };

            if let Some(reply) = reply {
                if let Err(e) = outgoing.send(Message::Text(reply.into_text())).await {
                    error!("[{}] Send failed, closing: {}", self.id, e);
                    break;
                }
            }
        }

        info!("[{}] Session ended", self.id);
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session = WsSession::new(
        state.ingestor.clone(),
        state.ws_idle_timeout,
        state.chunk_limits,
    );
    WS_SESSIONS_ACTIVE.inc();

    let (ws_tx, ws_rx) = socket.split();
    session.run(ws_rx, ws_tx).await;

    WS_SESSIONS_ACTIVE.dec();
}
