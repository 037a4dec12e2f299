// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! QC-18 Provider Bridge - origin-scoped permission and correlation layer
//! between untrusted dApp pages and the wallet backend.
//!
//! Pages send JSON-RPC-shaped calls over a duplex channel. The bridge tags
//! each connection with the origin reported by the transport, gates
//! privileged methods behind a human approval round per origin, and returns
//! every response only to the connection and identifier that asked.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                         PROVIDER BRIDGE (qc-18)                              │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │   page A ──┐    page B ──┐                                                   │
//! │            ▼             ▼                                                   │
//! │  ┌──────────────────────────────────────────┐                               │
//! │  │          Channel Multiplexer             │  origin captured at connect   │
//! │  │   (connection → Caller, open ids, queue) │  responses never broadcast    │
//! │  └────────────────────┬─────────────────────┘                               │
//! │                       │                                                     │
//! │  ┌────────────────────┴─────────────────────┐                               │
//! │  │            Request Router                │  open → engine                │
//! │  │   (method registry, denial policies)     │  privileged → gate → engine   │
//! │  └────────────────────┬─────────────────────┘                               │
//! │                       │                                                     │
//! │  ┌────────────────────┴─────────────────────┐      ┌───────────────────┐    │
//! │  │             Approval Gate                │─────▶│    Approval UI    │    │
//! │  └──────────┬─────────────────────┬─────────┘      └─────────┬─────────┘    │
//! │             │                     │                grant/deny (host API)    │
//! │  ┌──────────┴─────────┐ ┌─────────┴──────────┐                │             │
//! │  │  Permission Store  │ │  Approval Ledger   │◀───────────────┘             │
//! │  │ (durable, per org) │ │ (one round/origin) │                              │
//! │  └────────────────────┘ └────────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Method Classes
//!
//! - **Open**: informational calls forwarded without approval (eth_chainId, ...)
//! - **Privileged**: account-revealing and signing calls; need an `allowed`
//!   permission record for the calling origin
//!
//! # Usage
//!
//! ```ignore
//! use qc_18_provider_bridge::{BridgeConfig, ProviderBridge, create_approval_channel};
//!
//! let (ui, mut prompts) = create_approval_channel(64);
//! let bridge = ProviderBridge::with_default_persistence(config, engine, Arc::new(ui))?;
//! // UI task: show each prompt, then bridge.grant(&origin) or bridge.deny(&origin)
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod approval;
pub mod domain;
pub mod mux;
pub mod ports;
pub mod router;
pub mod service;
pub mod telemetry;
pub mod ws;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-exports for public API
pub use adapters::{
    create_approval_channel, ChannelApprovalUi, InMemoryPermissionPersistence,
    JsonFilePermissionPersistence,
};
pub use approval::{ApprovalGate, ApprovalLedger, ApprovalOutcome, PermissionStore};
pub use domain::config::BridgeConfig;
pub use domain::envelope::{RequestId, RpcRequest, RpcResponse};
pub use domain::error::{codes, ApiError, ApiResult, BridgeError, DenialReason, StoreError};
pub use domain::methods::{get_method_info, DenialPolicy, MethodAccess};
pub use domain::origin::{Caller, DisplayHint, Origin};
pub use domain::permission::{Decision, PermissionRecord, PermissionState};
pub use mux::{ChannelMultiplexer, ConnectError, ConnectRequest, ConnectionHandle};
pub use ports::outbound::{
    ApprovalPrompt, ApprovalUi, ApprovalUiError, ExecutionEngine, PermissionPersistence,
};
pub use router::RequestRouter;
pub use service::{BridgeSnapshot, ProviderBridge, ProviderBridgeService};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
