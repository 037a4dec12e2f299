//! Ports (hexagonal boundaries) for the Provider Bridge.

pub mod outbound;

pub use outbound::{
    ApprovalPrompt, ApprovalUi, ApprovalUiError, ExecutionEngine, PermissionPersistence,
    SystemTimeSource, TimeSource,
};
