//! Connection layers between a worker and a browser tab.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  ConnectionPool  │  one Session per worker
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │     Session      │  call ids, response/event correlation
//! └────────┬─────────┘
//!          │ text messages
//! ┌────────▼─────────┐
//! │  ProtocolDriver  │  WebSocket handshake and framing (no I/O)
//! └────────┬─────────┘
//!          │ raw bytes
//! ┌────────▼─────────┐
//! │    Transport     │  TCP stream
//! └──────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `socket` | TCP byte stream |
//! | `websocket` | Sans-I/O WebSocket client |
//! | `session` | Call/response correlation for one tab |
//! | `pool` | Worker to session mapping |

// ============================================================================
// Submodules
// ============================================================================

/// Per-worker session pool.
pub mod pool;

/// Call/response correlation for one tab.
pub mod session;

/// TCP byte stream.
pub mod socket;

/// Sans-I/O WebSocket client.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use pool::{Connect, ConnectionPool, PooledSession};
pub use session::{
    DEFAULT_CALL_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, Session, SessionOptions, SessionState,
};
pub use socket::Transport;
pub use websocket::{DriverEvent, ProtocolDriver};
