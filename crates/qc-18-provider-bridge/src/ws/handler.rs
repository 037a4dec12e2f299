//! WebSocket session for one page connection.
//!
//! Security features:
//! - Message size limits (default 1MB)
//! - Rate limiting per connection
//! - Idle timeout
//!
//! Limit violations are answered with a `-32005` error envelope; the
//! connection stays open. The idle timer does not close a connection while
//! any of its requests is still in flight (e.g. waiting on an approval).

use crate::domain::config::WebSocketConfig;
use crate::domain::envelope::{RpcRequest, RpcResponse};
use crate::domain::error::ApiError;
use crate::domain::ids::ConnectionId;
use crate::mux::ChannelMultiplexer;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Per-connection transport limits
#[derive(Debug, Clone)]
pub struct SessionLimits {
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Rate limit (messages per second per connection)
    pub rate_limit: u32,
    /// Idle timeout (disconnect if no activity)
    pub idle_timeout: Duration,
}

impl From<&WebSocketConfig> for SessionLimits {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            max_message_size: config.max_message_size,
            rate_limit: config.rate_limit,
            idle_timeout: config.idle_timeout,
        }
    }
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&WebSocketConfig::default())
    }
}

/// Fixed one-second window rate limiter plus size check
#[derive(Debug)]
pub struct FrameLimiter {
    limits: SessionLimits,
    /// Message counter for rate limiting
    message_count: u32,
    /// Rate limit window start
    rate_limit_window: Instant,
}

impl FrameLimiter {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            limits,
            message_count: 0,
            rate_limit_window: Instant::now(),
        }
    }

    /// Check rate limit, returns true if the frame is allowed
    pub fn check_rate_limit(&mut self) -> bool {
        let now = Instant::now();

        // Reset window every second
        if now.duration_since(self.rate_limit_window) >= Duration::from_secs(1) {
            self.rate_limit_window = now;
            self.message_count = 0;
        }

        self.message_count = self.message_count.saturating_add(1);
        self.message_count <= self.limits.rate_limit
    }

    /// Check message size, returns the error to answer with if too large
    pub fn check_message_size(&self, size: usize) -> Option<ApiError> {
        if size > self.limits.max_message_size {
            Some(ApiError::limit_exceeded(format!(
                "message too large: {} bytes (max: {})",
                size, self.limits.max_message_size
            )))
        } else {
            None
        }
    }

    /// Both checks in transport order: size first, then rate.
    ///
    /// A rate-limited frame is answered under its own id when it carries one.
    /// An oversize frame is never parsed.
    pub fn admit(&mut self, text: &str) -> Result<(), RpcResponse> {
        if let Some(error) = self.check_message_size(text.len()) {
            return Err(RpcResponse::failure(None, error));
        }
        if !self.check_rate_limit() {
            let error = ApiError::limit_exceeded("rate limit exceeded");
            return Err(RpcResponse::failure(RpcRequest::peek_id(text), error));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        self.limits.idle_timeout
    }
}

/// Drives one accepted WebSocket until it closes
pub struct WebSocketSession {
    mux: Arc<ChannelMultiplexer>,
    connection_id: ConnectionId,
    limiter: FrameLimiter,
}

impl WebSocketSession {
    pub fn new(mux: Arc<ChannelMultiplexer>, connection_id: ConnectionId, limits: SessionLimits) -> Self {
        Self {
            mux,
            connection_id,
            limiter: FrameLimiter::new(limits),
        }
    }

    /// Pump frames in, responses out. Unregisters the connection on exit.
    pub async fn run(mut self, socket: WebSocket, mut responses: mpsc::Receiver<RpcResponse>) {
        let connection_id = self.connection_id;
        info!(connection_id = %connection_id, "WebSocket session started");

        let (mut sink, mut stream) = socket.split();
        let (pong_tx, mut pong_rx) = mpsc::channel::<Vec<u8>>(8);

        let writer = tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    Some(response) = responses.recv() => match serde_json::to_string(&response) {
                        Ok(text) => Message::Text(text),
                        Err(e) => {
                            error!(connection_id = %connection_id, error = %e, "Failed to serialize response");
                            continue;
                        }
                    },
                    Some(data) = pong_rx.recv() => Message::Pong(data),
                    else => break,
                };
                if let Err(e) = sink.send(message).await {
                    debug!(connection_id = %connection_id, error = %e, "WebSocket send failed");
                    break;
                }
            }
        });

        loop {
            let frame = match tokio::time::timeout(self.limiter.idle_timeout(), stream.next()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) if !self.idle_expired() => {
                    debug!(connection_id = %connection_id, "Idle with requests in flight");
                    continue;
                }
                Err(_) => {
                    info!(connection_id = %connection_id, "Closing idle WebSocket connection");
                    break;
                }
            };

            match frame {
                Ok(Message::Text(text)) => {
                    self.on_frame(&text).await;
                }
                Ok(Message::Binary(data)) => {
                    if let Some(error) = self.limiter.check_message_size(data.len()) {
                        self.reject(RpcResponse::failure(None, error)).await;
                        continue;
                    }
                    match String::from_utf8(data) {
                        Ok(text) => self.on_frame(&text).await,
                        Err(_) => {
                            let error = ApiError::parse_error("binary frame is not UTF-8");
                            self.reject(RpcResponse::failure(None, error)).await
                        }
                    }
                }
                Ok(Message::Ping(data)) => {
                    if pong_tx.send(data).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Pong(_)) => {
                    // Ignore pongs
                }
                Ok(Message::Close(_)) => {
                    debug!(connection_id = %connection_id, "WebSocket close received");
                    break;
                }
                Err(e) => {
                    warn!(connection_id = %connection_id, error = %e, "WebSocket error");
                    break;
                }
            }
        }

        self.mux.on_disconnect(connection_id);
        writer.abort();
        info!(connection_id = %connection_id, "WebSocket session ended");
    }

    async fn on_frame(&mut self, text: &str) {
        match self.limiter.admit(text) {
            Ok(()) => self.mux.on_message(self.connection_id, text).await,
            Err(response) => self.reject(response).await,
        }
    }

    async fn reject(&self, response: RpcResponse) {
        if let Some(error) = response.error() {
            warn!(connection_id = %self.connection_id, error = %error, "Frame rejected");
        }
        self.mux.send(self.connection_id, response).await;
    }

    /// Whether an idle timeout may close the connection
    fn idle_expired(&self) -> bool {
        self.mux.in_flight(self.connection_id) == 0
    }
}
