//! WebSocket transport for page connections.
//!
//! The page's `Origin` header (and an optional `icon` query parameter) are
//! captured at upgrade time and become the connection's identity.

pub mod handler;

pub use handler::{FrameLimiter, SessionLimits, WebSocketSession};
