//! WebSocket connection gateway.
//!
//! One task per socket: it registers the connection with the
//! [`SyncEngine`], decodes inbound frames into engine operations, and
//! forwards whatever the engine queues for the connection back out.

use std::time::{Duration, Instant};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use board_core::{normalize_display_name, ConnectionId, VERSION};
use futures::{stream::SplitSink, SinkExt, StreamExt};

use crate::config::GatewayConfig;
use crate::engine::SyncEngine;
use crate::metrics::{
    record_dropped_event, record_rate_limited, record_validation_failure, record_ws_message,
};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::validation::{
    validate_chat_message, validate_coordinates, validate_message_size, validate_session_key,
    ValidationError,
};
use crate::AppState;

/// Token bucket rate limiter for WebSocket connections.
///
/// Allows burst traffic up to `capacity` tokens, refilling at `refill_rate` tokens per second.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: f64,
    capacity: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter.
    ///
    /// # Arguments
    ///
    /// * `burst_capacity` - Maximum number of tokens (burst limit)
    /// * `sustained_rate` - Tokens added per second (sustained rate)
    #[must_use]
    pub fn new(burst_capacity: u32, sustained_rate: u32) -> Self {
        Self {
            tokens: f64::from(burst_capacity),
            capacity: f64::from(burst_capacity),
            refill_rate: f64::from(sustained_rate),
            last_refill: Instant::now(),
        }
    }

    /// Try to consume one token. Returns true if allowed, false if rate limited.
    pub fn try_consume(&mut self) -> bool {
        self.try_consume_above(0.0)
    }

    /// Consume one token only if `reserve` tokens remain afterwards.
    pub fn try_consume_above(&mut self, reserve: f64) -> bool {
        self.refill();
        if self.tokens >= 1.0 + reserve {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Maximum number of tokens.
    #[must_use]
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Time until the next token is available; `None` if one is available now.
    #[must_use]
    pub fn time_until_available(&self) -> Option<Duration> {
        if self.tokens >= 1.0 {
            None
        } else if self.refill_rate <= 0.0 {
            Some(Duration::MAX)
        } else {
            Some(Duration::from_secs_f64((1.0 - self.tokens) / self.refill_rate))
        }
    }
}

/// Share of the bucket cursor moves may not dip into.
pub const CURSOR_RESERVE_FRACTION: f64 = 0.25;

/// What the gateway does with one parsed inbound event.
#[derive(Debug)]
enum Admission {
    Dispatch(ClientMessage),
    /// Cursor move dropped without a reply.
    Shed,
    /// Canvas update held until a token frees up.
    Deferred,
    Limited,
}

/// Per-connection admission control for inbound events.
///
/// One token bucket covers every event kind, with two exceptions. Cursor
/// moves are shed silently once the bucket is down to its reserve, so they
/// run out before anything else. A canvas update that finds the bucket
/// empty is held instead of dropped; a newer update replaces the held one,
/// which is applied as soon as a token is available.
#[derive(Debug)]
pub struct InboundGate {
    limiter: RateLimiter,
    cursor_reserve: f64,
    deferred: Option<ClientMessage>,
}

impl InboundGate {
    /// Create a gate with the given bucket size and refill rate.
    #[must_use]
    pub fn new(burst_capacity: u32, sustained_rate: u32) -> Self {
        let limiter = RateLimiter::new(burst_capacity, sustained_rate);
        let cursor_reserve = (limiter.capacity() * CURSOR_RESERVE_FRACTION).floor();
        Self {
            limiter,
            cursor_reserve,
            deferred: None,
        }
    }

    fn admit(&mut self, message: ClientMessage) -> Admission {
        match message {
            ClientMessage::CursorMove { .. } => {
                if self.limiter.try_consume_above(self.cursor_reserve) {
                    Admission::Dispatch(message)
                } else {
                    Admission::Shed
                }
            }
            ClientMessage::UpdateCanvas { .. } => {
                if self.limiter.try_consume() {
                    // A newer full snapshot supersedes anything held.
                    self.deferred = None;
                    Admission::Dispatch(message)
                } else {
                    if self.deferred.replace(message).is_some() {
                        record_dropped_event("update_canvas", "coalesced");
                    }
                    Admission::Deferred
                }
            }
            other => {
                if self.limiter.try_consume() {
                    Admission::Dispatch(other)
                } else {
                    Admission::Limited
                }
            }
        }
    }

    /// Whether a canvas update is being held.
    #[must_use]
    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// How long until the held canvas update can be applied.
    #[must_use]
    pub fn deferred_delay(&self) -> Option<Duration> {
        self.deferred
            .as_ref()
            .map(|_| self.limiter.time_until_available().unwrap_or(Duration::ZERO))
    }

    fn take_deferred(&mut self) -> Option<ClientMessage> {
        if self.deferred.is_some() && self.limiter.try_consume() {
            self.deferred.take()
        } else {
            None
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn retry_after_ms(&self) -> u64 {
        self.limiter
            .time_until_available()
            .map_or(100, |d| d.as_millis().min(10_000) as u64)
    }
}

/// Detaches the connection from the engine when the socket task ends,
/// however it ends.
struct DetachGuard {
    engine: SyncEngine,
    connection_id: ConnectionId,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        self.engine.detach(self.connection_id);
    }
}

/// `GET /ws`: check the browser origin, then upgrade.
///
/// Requests without an `Origin` header come from non-browser clients and
/// are let through.
#[tracing::instrument(name = "websocket_connect", skip_all)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let allowed = origin
            .to_str()
            .is_ok_and(|origin| state.gateway.origin_allowed(origin));
        if !allowed {
            tracing::warn!(origin = ?origin, "WebSocket upgrade refused for origin");
            record_validation_failure("origin");
            return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
        }
    }

    let engine = state.engine.clone();
    let config = state.gateway.clone();
    ws.max_message_size(config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, engine, config))
}

/// Drive one connection until it closes.
pub async fn handle_socket(socket: WebSocket, engine: SyncEngine, config: GatewayConfig) {
    let (mut sender, mut receiver) = socket.split();

    let connection_id = ConnectionId::new();
    let mut outbound = engine.register(connection_id);
    let _guard = DetachGuard {
        engine: engine.clone(),
        connection_id,
    };
    let mut gate = InboundGate::new(config.rate_limit_burst, config.rate_limit_sustained);
    tracing::info!(%connection_id, "WebSocket connected");

    let welcome = ServerMessage::Welcome {
        connection_id,
        version: VERSION.to_string(),
    };
    if send_json(&mut sender, &welcome).await.is_err() {
        return;
    }

    let period = config.keepalive_interval;
    let mut keepalive = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let reply = process_text(
                            &engine,
                            connection_id,
                            &config,
                            &mut gate,
                            text.as_str(),
                        );
                        if let Some(reply) = reply {
                            if send_json(&mut sender, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let error = ServerMessage::error("unsupported_frame", "binary frames are not supported");
                        if send_json(&mut sender, &error).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(%connection_id, error = %e, "WebSocket receive error");
                        break;
                    }
                }
            }
            message = outbound.recv() => {
                match message {
                    Some(message) => {
                        if send_json(&mut sender, &message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::time::sleep(gate.deferred_delay().unwrap_or(Duration::MAX)), if gate.has_deferred() => {
                if let Some(reply) = flush_deferred(&engine, connection_id, &mut gate) {
                    if send_json(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                engine.keepalive(connection_id);
            }
        }
    }

    tracing::info!(%connection_id, "WebSocket disconnected");
}

async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(kind = message.kind(), "Failed to serialize message: {}", e);
            return Ok(());
        }
    };
    record_ws_message("outbound", message.kind());
    sender.send(Message::Text(json.into())).await
}

/// Handle one inbound text frame. Returns a reply for the sender, if any.
///
/// Broadcasts to other participants go through the engine's channels, not
/// through the return value.
pub fn process_text(
    engine: &SyncEngine,
    connection_id: ConnectionId,
    config: &GatewayConfig,
    gate: &mut InboundGate,
    text: &str,
) -> Option<ServerMessage> {
    if let Err(e) = validate_message_size(text.len(), config.max_message_bytes) {
        tracing::warn!(%connection_id, "Message rejected: {}", e);
        record_validation_failure(e.kind());
        return Some(ServerMessage::error("message_too_large", e.to_string()));
    }

    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(%connection_id, "Unparseable message: {}", e);
            if !gate.limiter.try_consume() {
                record_rate_limited("parse_error");
                return None;
            }
            return Some(ServerMessage::error(
                "parse_error",
                format!("Invalid message: {e}"),
            ));
        }
    };
    let kind = message.kind();
    record_ws_message("inbound", kind);

    match gate.admit(message) {
        Admission::Dispatch(message) => dispatch_reply(engine, connection_id, message),
        Admission::Shed => {
            tracing::trace!(%connection_id, "Cursor move shed");
            record_rate_limited(kind);
            None
        }
        Admission::Deferred => {
            tracing::debug!(%connection_id, "Canvas update held by rate limit");
            record_rate_limited(kind);
            None
        }
        Admission::Limited => {
            tracing::warn!(%connection_id, kind, "Rate limit exceeded");
            record_rate_limited(kind);
            let retry_after = gate.retry_after_ms();
            Some(ServerMessage::error(
                "rate_limited",
                format!("Rate limit exceeded. Retry after {retry_after}ms"),
            ))
        }
    }
}

/// Apply a held canvas update if a token has freed up.
///
/// Returns a reply for the sender if the update turned out invalid.
pub fn flush_deferred(
    engine: &SyncEngine,
    connection_id: ConnectionId,
    gate: &mut InboundGate,
) -> Option<ServerMessage> {
    let message = gate.take_deferred()?;
    tracing::debug!(%connection_id, "Applying held canvas update");
    dispatch_reply(engine, connection_id, message)
}

fn dispatch_reply(
    engine: &SyncEngine,
    connection_id: ConnectionId,
    message: ClientMessage,
) -> Option<ServerMessage> {
    match dispatch(engine, connection_id, message) {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!(%connection_id, "Invalid message: {}", e);
            record_validation_failure(e.kind());
            Some(ServerMessage::error("validation_error", e.to_string()))
        }
    }
}

fn dispatch(
    engine: &SyncEngine,
    connection_id: ConnectionId,
    message: ClientMessage,
) -> Result<Option<ServerMessage>, ValidationError> {
    if let Some(key) = message.session_key() {
        validate_session_key(key)?;
    }

    match message {
        ClientMessage::JoinSession {
            session_key,
            display_name,
        } => {
            let display_name = normalize_display_name(display_name.as_deref());
            engine.join(connection_id, &session_key, &display_name);
        }
        ClientMessage::UpdateCanvas {
            session_key,
            elements,
            background_color,
        } => {
            engine.mutate(connection_id, &session_key, elements, background_color);
        }
        ClientMessage::SendMessage {
            session_key,
            message,
            display_name,
            ..
        } => {
            validate_chat_message(&message)?;
            let display_name = normalize_display_name(display_name.as_deref());
            engine.chat(connection_id, &session_key, &message, &display_name);
        }
        ClientMessage::CursorMove {
            session_key,
            x,
            y,
            display_name,
            ..
        } => {
            validate_coordinates(x, y)?;
            let display_name = normalize_display_name(display_name.as_deref());
            engine.cursor(connection_id, &session_key, x, y, &display_name);
        }
        ClientMessage::Ping => return Ok(Some(ServerMessage::Pong)),
        ClientMessage::Pong => {}
    }
    Ok(None)
}
