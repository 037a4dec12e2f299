//! Domain types for the Provider Bridge.
//!
//! Pure data and validation: no I/O, no async.

pub mod config;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod methods;
pub mod origin;
pub mod permission;

// Re-exports for convenience
pub use config::{BridgeConfig, ConfigError};
pub use envelope::{MalformedRequest, RequestId, RpcRequest, RpcResponse};
pub use error::{ApiError, ApiResult, BridgeError, DenialReason, StoreError};
pub use ids::{ConnectionId, RoundId};
pub use methods::{get_method_info, DenialPolicy, MethodAccess, MethodInfo};
pub use origin::{Caller, DisplayHint, Origin, OriginError};
pub use permission::{Decision, PermissionRecord, PermissionState};
