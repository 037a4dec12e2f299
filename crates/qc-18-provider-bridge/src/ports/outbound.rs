//! Outbound ports for the Provider Bridge.
//!
//! The bridge never renders UI, executes chain calls or touches disk itself.
//! Those are injected through the traits below.

use crate::domain::error::{ApiError, StoreError};
use crate::domain::ids::RoundId;
use crate::domain::origin::{DisplayHint, Origin};
use crate::domain::permission::PermissionRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// What the trusted UI is asked to show for one approval round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPrompt {
    pub round_id: RoundId,
    pub origin: Origin,
    pub display_hint: Option<DisplayHint>,
    /// Human-readable capability being asked for
    pub purpose: String,
}

/// Failure to surface a prompt. Any variant denies the round immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalUiError {
    #[error("approval UI is closed")]
    Closed,
    #[error("approval UI is busy")]
    Busy,
    #[error("approval UI failed: {0}")]
    Failed(String),
}

/// Consent surface.
///
/// `request_approval` only has to *show* the prompt. The human's answer comes
/// back later through `ProviderBridge::grant` / `ProviderBridge::deny`.
#[async_trait]
pub trait ApprovalUi: Send + Sync {
    async fn request_approval(&self, prompt: ApprovalPrompt) -> Result<(), ApprovalUiError>;
}

/// Internal chain / wallet executor.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Run an internal method. Errors are relayed to the page as-is.
    async fn execute(&self, method: &str, params: Value) -> Result<Value, ApiError>;
}

/// Durable backing for permission records.
pub trait PermissionPersistence: Send + Sync {
    fn load(&self) -> Result<HashMap<Origin, PermissionRecord>, StoreError>;

    /// Insert or overwrite the record for `record.origin`.
    fn save(&self, record: &PermissionRecord) -> Result<(), StoreError>;

    /// Insert only if no record exists for `record.origin`.
    ///
    /// Returns whether the record was written. An existing record (e.g. a
    /// decision that landed first) is left untouched.
    fn save_new(&self, record: &PermissionRecord) -> Result<bool, StoreError>;

    fn remove(&self, origin: &Origin) -> Result<(), StoreError>;
}

/// Time source trait for testability
pub trait TimeSource: Send + Sync {
    /// Unix seconds
    fn now(&self) -> u64;
}

/// System time implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            // Clock before Unix epoch - return 0 rather than panic
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_is_after_2020() {
        assert!(SystemTimeSource.now() > 1_577_836_800);
    }

    #[test]
    fn test_ui_error_display() {
        assert_eq!(ApprovalUiError::Closed.to_string(), "approval UI is closed");
        assert!(ApprovalUiError::Failed("x".into())
            .to_string()
            .contains('x'));
    }
}
