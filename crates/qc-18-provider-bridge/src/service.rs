//! Provider Bridge service: component wiring, host API and WebSocket server.

use crate::adapters::file::JsonFilePermissionPersistence;
use crate::adapters::memory::InMemoryPermissionPersistence;
use crate::approval::{sweep_task, ApprovalGate, ApprovalLedger, PermissionStore};
use crate::domain::config::BridgeConfig;
use crate::domain::error::{BridgeError, StoreError};
use crate::domain::origin::Origin;
use crate::domain::permission::PermissionRecord;
use crate::mux::{ChannelMultiplexer, ConnectRequest};
use crate::ports::outbound::{
    ApprovalUi, ExecutionEngine, PermissionPersistence, SystemTimeSource, TimeSource,
};
use crate::router::RequestRouter;
use crate::ws::{SessionLimits, WebSocketSession};
use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Point-in-time counters for hosts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeSnapshot {
    pub connections: usize,
    pub pending_rounds: usize,
    pub permission_records: usize,
    pub rounds_opened: u64,
    pub rounds_joined: u64,
    pub rounds_granted: u64,
    pub rounds_denied: u64,
    pub rounds_expired: u64,
    pub stale_decisions: u64,
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub requests_handled: u64,
    pub malformed_requests: u64,
    pub dropped_sends: u64,
}

/// The assembled bridge.
///
/// Pages talk to it through [`ChannelMultiplexer`]; the trusted host talks to
/// it through the methods here. Decisions never arrive over the page channel.
pub struct ProviderBridge {
    config: BridgeConfig,
    store: Arc<PermissionStore>,
    ledger: Arc<ApprovalLedger>,
    gate: Arc<ApprovalGate>,
    mux: Arc<ChannelMultiplexer>,
}

impl ProviderBridge {
    /// Wire every component. Loads the permission table from `persistence`.
    pub fn new(
        config: BridgeConfig,
        engine: Arc<dyn ExecutionEngine>,
        ui: Arc<dyn ApprovalUi>,
        persistence: Arc<dyn PermissionPersistence>,
    ) -> Result<Self, BridgeError> {
        Self::with_clock(config, engine, ui, persistence, Arc::new(SystemTimeSource))
    }

    pub fn with_clock(
        config: BridgeConfig,
        engine: Arc<dyn ExecutionEngine>,
        ui: Arc<dyn ApprovalUi>,
        persistence: Arc<dyn PermissionPersistence>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, BridgeError> {
        // Validate configuration
        config.validate()?;

        let store = Arc::new(PermissionStore::new(persistence, clock)?);
        let ledger = Arc::new(ApprovalLedger::new());
        let gate = Arc::new(ApprovalGate::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            ui,
        ));
        let router = Arc::new(RequestRouter::new(
            Arc::clone(&gate),
            engine,
            &config.methods,
        ));
        let mux = Arc::new(ChannelMultiplexer::new(
            router,
            config.websocket.outbound_buffer,
            config.websocket.max_connections,
        ));

        Ok(Self {
            config,
            store,
            ledger,
            gate,
            mux,
        })
    }

    /// Use the configured storage: a JSON file if `permissions_path` is set,
    /// memory otherwise.
    pub fn with_default_persistence(
        config: BridgeConfig,
        engine: Arc<dyn ExecutionEngine>,
        ui: Arc<dyn ApprovalUi>,
    ) -> Result<Self, BridgeError> {
        let persistence = default_persistence(&config)?;
        Self::new(config, engine, ui, persistence)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn multiplexer(&self) -> Arc<ChannelMultiplexer> {
        Arc::clone(&self.mux)
    }

    /// Human granted the origin's open round. False if nothing was pending.
    pub fn grant(&self, origin: &Origin) -> bool {
        self.gate.grant(origin)
    }

    /// Human denied the origin's open round. False if nothing was pending.
    pub fn deny(&self, origin: &Origin) -> bool {
        self.gate.deny(origin)
    }

    pub fn permission(&self, origin: &Origin) -> Option<PermissionRecord> {
        self.store.get(origin)
    }

    pub fn permissions(&self) -> Vec<PermissionRecord> {
        self.store.snapshot()
    }

    /// Drop the origin's record; its next privileged call opens a fresh round.
    pub fn revoke(&self, origin: &Origin) -> Result<Option<PermissionRecord>, StoreError> {
        self.store.revoke(origin)
    }

    pub fn is_pending(&self, origin: &Origin) -> bool {
        self.ledger.is_pending(origin)
    }

    /// Start the round expiry sweeper on the current runtime
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        tokio::spawn(sweep_task(
            Arc::clone(&self.ledger),
            self.config.approval.round_ttl,
            self.config.approval.sweep_interval,
        ))
    }

    pub fn snapshot(&self) -> BridgeSnapshot {
        let ledger = self.ledger.stats();
        let mux = self.mux.stats();
        BridgeSnapshot {
            connections: self.mux.connection_count(),
            pending_rounds: self.ledger.pending_count(),
            permission_records: self.store.len(),
            rounds_opened: ledger.rounds_opened.load(Ordering::Relaxed),
            rounds_joined: ledger.rounds_joined.load(Ordering::Relaxed),
            rounds_granted: ledger.rounds_granted.load(Ordering::Relaxed),
            rounds_denied: ledger.rounds_denied.load(Ordering::Relaxed),
            rounds_expired: ledger.rounds_expired.load(Ordering::Relaxed),
            stale_decisions: ledger.stale_decisions.load(Ordering::Relaxed),
            connections_accepted: mux.connections_accepted.load(Ordering::Relaxed),
            connections_rejected: mux.connections_rejected.load(Ordering::Relaxed),
            requests_handled: mux.requests_handled.load(Ordering::Relaxed),
            malformed_requests: mux.malformed_requests.load(Ordering::Relaxed),
            dropped_sends: mux.dropped_sends.load(Ordering::Relaxed),
        }
    }
}

fn default_persistence(config: &BridgeConfig) -> Result<Arc<dyn PermissionPersistence>, StoreError> {
    Ok(match &config.storage.permissions_path {
        Some(path) => Arc::new(JsonFilePermissionPersistence::open(path)?),
        None => Arc::new(InMemoryPermissionPersistence::new()),
    })
}

/// Provider Bridge service: the bridge plus its WebSocket server
pub struct ProviderBridgeService {
    bridge: Arc<ProviderBridge>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ProviderBridgeService {
    pub fn new(bridge: Arc<ProviderBridge>) -> Self {
        Self {
            bridge,
            shutdown_tx: None,
        }
    }

    pub fn bridge(&self) -> Arc<ProviderBridge> {
        Arc::clone(&self.bridge)
    }

    /// Serve until `shutdown()` is called
    pub async fn start(&mut self) -> Result<(), BridgeError> {
        info!("Starting Provider Bridge...");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let sweeper = self.bridge.spawn_sweeper();

        let config = self.bridge.config();
        if !config.websocket.enabled {
            info!("WebSocket server disabled");
            let _ = shutdown_rx.await;
            sweeper.abort();
            return Ok(());
        }

        let addr = config.ws_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Bind(format!("{}: {}", addr, e)))?;
        info!(addr = %addr, path = %config.websocket.path, "Starting WebSocket server");

        let result = axum::serve(listener, build_router(Arc::clone(&self.bridge)))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                info!("Received shutdown signal");
            })
            .await
            .map_err(|e| BridgeError::Server(e.to_string()));

        sweeper.abort();
        if let Err(ref e) = result {
            error!(error = %e, "WebSocket server error");
        }
        info!("Provider Bridge stopped");
        result
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    bridge: Arc<ProviderBridge>,
    limits: SessionLimits,
}

/// Upgrade query parameters
#[derive(Debug, Default, Deserialize)]
struct UpgradeQuery {
    /// Favicon URL shown in the approval prompt
    icon: Option<String>,
}

/// Build the WebSocket router
pub fn build_router(bridge: Arc<ProviderBridge>) -> Router {
    let path = bridge.config().websocket.path.clone();
    let state = AppState {
        limits: SessionLimits::from(&bridge.config().websocket),
        bridge,
    };

    Router::new()
        .route(&path, get(ws_upgrade))
        .route("/health", get(health_check))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UpgradeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let request = ConnectRequest {
        origin: headers
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        favicon: query.icon,
    };

    let mux = state.bridge.multiplexer();
    let caller = match mux.accept(&request) {
        Ok(caller) => caller,
        Err(e) => return (StatusCode::FORBIDDEN, e.to_string()).into_response(),
    };

    let limits = state.limits.clone();
    ws.on_upgrade(move |socket| async move {
        match mux.register(caller) {
            Ok(handle) => {
                WebSocketSession::new(Arc::clone(&mux), handle.id, limits)
                    .run(socket, handle.responses)
                    .await
            }
            Err(e) => warn!(error = %e, "Dropping upgraded socket"),
        }
    })
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "bridge": state.bridge.snapshot(),
    }))
}
