//! Adapters for the Provider Bridge.
//!
//! Infrastructure implementations of the outbound ports.

pub mod channel_ui;
pub mod file;
pub mod memory;

pub use channel_ui::{create_approval_channel, ChannelApprovalUi};
pub use file::JsonFilePermissionPersistence;
pub use memory::InMemoryPermissionPersistence;
