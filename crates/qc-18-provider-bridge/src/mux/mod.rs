//! Channel Multiplexer: live page connections and response correlation.
//!
//! Each connection gets an immutable [`Caller`] at accept time and its own
//! bounded response queue. A response is only ever pushed onto the queue of
//! the connection that sent the request, under the request's own identifier.

use crate::domain::envelope::{RequestId, RpcRequest, RpcResponse};
use crate::domain::error::ApiError;
use crate::domain::ids::ConnectionId;
use crate::domain::origin::{Caller, DisplayHint, Origin, OriginError};
use crate::router::RequestRouter;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Transport-level facts captured when a page connects.
///
/// Both fields come from the transport (e.g. the `Origin` header), never from
/// message content.
#[derive(Debug, Clone, Default)]
pub struct ConnectRequest {
    pub origin: Option<String>,
    pub favicon: Option<String>,
}

impl ConnectRequest {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            favicon: None,
        }
    }

    pub fn with_favicon(mut self, favicon: impl Into<String>) -> Self {
        self.favicon = Some(favicon.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("connection has no origin")]
    MissingOrigin,
    #[error("unusable origin: {0}")]
    InvalidOrigin(#[from] OriginError),
    #[error("too many connections (max {0})")]
    TooManyConnections(usize),
}

/// Returned to the transport for a registered connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub caller: Caller,
    /// Responses for this connection, in completion order
    pub responses: mpsc::Receiver<RpcResponse>,
}

struct ConnectionEntry {
    caller: Caller,
    outbound: mpsc::Sender<RpcResponse>,
    /// Identifiers with a request still in flight
    open: Mutex<HashSet<RequestId>>,
}

/// Multiplexer statistics
#[derive(Debug, Default)]
pub struct MuxStats {
    pub connections_accepted: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_handled: AtomicU64,
    pub malformed_requests: AtomicU64,
    pub duplicate_ids: AtomicU64,
    /// Responses for connections that had already gone away
    pub dropped_sends: AtomicU64,
}

pub struct ChannelMultiplexer {
    router: Arc<RequestRouter>,
    connections: DashMap<ConnectionId, Arc<ConnectionEntry>>,
    outbound_buffer: usize,
    max_connections: usize,
    stats: Arc<MuxStats>,
}

impl ChannelMultiplexer {
    pub fn new(router: Arc<RequestRouter>, outbound_buffer: usize, max_connections: usize) -> Self {
        Self {
            router,
            connections: DashMap::new(),
            outbound_buffer: outbound_buffer.max(1),
            max_connections,
            stats: Arc::new(MuxStats::default()),
        }
    }

    /// Derive the caller identity from transport facts.
    pub fn accept(&self, request: &ConnectRequest) -> Result<Caller, ConnectError> {
        let caller = request
            .origin
            .as_deref()
            .ok_or(ConnectError::MissingOrigin)
            .and_then(|raw| Origin::parse(raw).map_err(ConnectError::from))
            // An unusable hint is dropped, not fatal
            .map(|origin| {
                Caller::new(
                    origin,
                    request.favicon.as_deref().and_then(DisplayHint::parse),
                )
            });

        if let Err(ref e) = caller {
            self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(origin = ?request.origin, error = %e, "Connection rejected");
        }
        caller
    }

    /// Register an accepted caller.
    pub fn register(&self, caller: Caller) -> Result<ConnectionHandle, ConnectError> {
        if self.connections.len() >= self.max_connections {
            self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(origin = %caller.origin, max = self.max_connections, "Connection limit reached");
            return Err(ConnectError::TooManyConnections(self.max_connections));
        }

        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        self.connections.insert(
            id,
            Arc::new(ConnectionEntry {
                caller: caller.clone(),
                outbound: tx,
                open: Mutex::new(HashSet::new()),
            }),
        );
        self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
        info!(connection_id = %id, origin = %caller.origin, "Connection registered");

        Ok(ConnectionHandle {
            id,
            caller,
            responses: rx,
        })
    }

    /// Accept and register in one step. Connections without a usable origin are refused.
    pub fn on_connect(&self, request: &ConnectRequest) -> Result<ConnectionHandle, ConnectError> {
        self.accept(request).and_then(|caller| self.register(caller))
    }

    /// Handle one inbound text frame.
    ///
    /// Returns as soon as the request is validated; routing runs on its own
    /// task so a request waiting for approval never stalls the connection.
    pub async fn on_message(self: &Arc<Self>, id: ConnectionId, text: &str) {
        let Some(entry) = self.entry(id) else {
            debug!(connection_id = %id, "Message for unknown connection ignored");
            return;
        };

        let request = match RpcRequest::parse(text) {
            Ok(request) => request,
            Err(malformed) => {
                self.stats.malformed_requests.fetch_add(1, Ordering::Relaxed);
                debug!(connection_id = %id, error = %malformed.error, "Malformed request");
                self.send(id, malformed.into_response()).await;
                return;
            }
        };

        if !entry.open.lock().insert(request.id.clone()) {
            self.stats.duplicate_ids.fetch_add(1, Ordering::Relaxed);
            warn!(connection_id = %id, request_id = %request.id, "Request id already in flight");
            let error = ApiError::invalid_request(format!("id {} is already in use", request.id));
            self.send(id, RpcResponse::failure(Some(request.id), error))
                .await;
            return;
        }

        self.stats.requests_handled.fetch_add(1, Ordering::Relaxed);
        debug!(
            connection_id = %id,
            origin = %entry.caller.origin,
            request_id = %request.id,
            method = %request.method,
            "Routing request"
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let RpcRequest { id: request_id, method, params } = request;
            let result = this.router.route(&entry.caller, &method, params).await;
            // The id is free again before the page can see the response
            entry.open.lock().remove(&request_id);
            this.send(id, RpcResponse::from_result(request_id, result))
                .await;
        });
    }

    /// Deliver a response. A closed or unknown connection is a silent no-op.
    ///
    /// Returns whether the response was queued.
    pub async fn send(&self, id: ConnectionId, response: RpcResponse) -> bool {
        // Clone out of the map so no shard lock is held across the await
        let Some(entry) = self.entry(id) else {
            self.stats.dropped_sends.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = %id, "Response for closed connection dropped");
            return false;
        };

        if entry.outbound.send(response).await.is_err() {
            self.stats.dropped_sends.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = %id, "Connection receiver gone, response dropped");
            return false;
        }
        true
    }

    /// Forget a connection. In-flight requests finish but their responses are dropped.
    pub fn on_disconnect(&self, id: ConnectionId) {
        if let Some((_, entry)) = self.connections.remove(&id) {
            info!(
                connection_id = %id,
                origin = %entry.caller.origin,
                in_flight = entry.open.lock().len(),
                "Connection closed"
            );
        }
    }

    fn entry(&self, id: ConnectionId) -> Option<Arc<ConnectionEntry>> {
        self.connections.get(&id).map(|e| Arc::clone(e.value()))
    }

    pub fn caller(&self, id: ConnectionId) -> Option<Caller> {
        self.connections.get(&id).map(|e| e.caller.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Requests still in flight on a connection
    pub fn in_flight(&self, id: ConnectionId) -> usize {
        self.connections.get(&id).map_or(0, |e| e.open.lock().len())
    }

    pub fn router(&self) -> &Arc<RequestRouter> {
        &self.router
    }

    pub fn stats(&self) -> &MuxStats {
        &self.stats
    }
}
