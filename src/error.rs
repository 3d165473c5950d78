//! Error types for headless PDF rendering.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use headless_pdf::{PrintParams, Renderer, Result, WorkerId};
//!
//! async fn example(renderer: &Renderer) -> Result<Vec<u8>> {
//!     renderer
//!         .render_to_pdf(WorkerId::new(1), "<h1>Hello</h1>", &PrintParams::default())
//!         .await
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::ExecutableNotFound`] |
//! | Process | [`Error::ProcessLaunchFailed`], [`Error::ProcessAcquisition`], [`Error::StartupTimeout`] |
//! | Connection | [`Error::ConnectionRefused`], [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::Remote`] |
//! | Execution | [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`], [`Error::Decode`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CallId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when renderer configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Browser executable not found at path.
    #[error("Browser executable not found at: {path}")]
    ExecutableNotFound {
        /// Path where the executable was expected.
        path: PathBuf,
    },

    // ========================================================================
    // Process Errors
    // ========================================================================
    /// Failed to launch the browser process.
    #[error("Failed to launch browser: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// On-demand browser acquisition failed or produced no usable path.
    #[error("Browser acquisition failed: {message}")]
    ProcessAcquisition {
        /// Description of the acquisition failure.
        message: String,
    },

    /// The debugging port never became reachable after spawning.
    #[error("Browser did not open port {port} after {attempts} attempts")]
    StartupTimeout {
        /// Debugging port that was polled.
        port: u16,
        /// Number of probes performed.
        attempts: u32,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Nothing is listening at the debugging endpoint.
    ///
    /// This is the only error that triggers an on-demand browser spawn.
    #[error("Connection refused: {address}")]
    ConnectionRefused {
        /// Address the connection was attempted to.
        address: String,
    },

    /// Transport could not be opened for a reason other than refusal.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Transport open or WebSocket handshake timed out.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Operation attempted on, or interrupted by, a closed session.
    ///
    /// The owner must drop the session and create a new one.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed handshake, frame, or message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// The browser reported an error for a specific call.
    #[error("Remote error in {method} ({code}): {message}")]
    Remote {
        /// Method of the failed call.
        method: String,
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
        /// Optional extra error data.
        data: Option<Value>,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// No matching response or event arrived within the call timeout.
    #[error("Call {id} ({method}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The call ID that timed out.
        id: CallId,
        /// Method of the call.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP error while talking to the DevTools endpoint.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid base64 payload.
    #[error("Decode error: {0}")]
    Decode(#[from] base64::DecodeError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an executable not found error.
    #[inline]
    pub fn executable_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ExecutableNotFound { path: path.into() }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(message: impl Into<String>) -> Self {
        Self::ProcessLaunchFailed {
            message: message.into(),
        }
    }

    /// Creates a process acquisition error.
    #[inline]
    pub fn process_acquisition(message: impl Into<String>) -> Self {
        Self::ProcessAcquisition {
            message: message.into(),
        }
    }

    /// Creates a startup timeout error.
    #[inline]
    pub fn startup_timeout(port: u16, attempts: u32) -> Self {
        Self::StartupTimeout { port, attempts }
    }

    /// Creates a connection refused error.
    #[inline]
    pub fn connection_refused(address: impl Into<String>) -> Self {
        Self::ConnectionRefused {
            address: address.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a remote error.
    #[inline]
    pub fn remote(
        method: impl Into<String>,
        code: i64,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self::Remote {
            method: method.into(),
            code,
            message: message.into(),
            data,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(id: CallId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            id,
            method: method.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::RequestTimeout { .. }
                | Self::StartupTimeout { .. }
        )
    }

    /// Returns `true` if nothing was listening at the endpoint.
    #[inline]
    #[must_use]
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused { .. }
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry with a fresh session.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Remote { .. } | Self::ConnectionClosed | Self::RequestTimeout { .. }
        )
    }

    /// Returns `true` if the session that produced this error must not be reused.
    #[inline]
    #[must_use]
    pub fn requires_reset(&self) -> bool {
        self.is_recoverable()
            || matches!(
                self,
                Self::Protocol { .. } | Self::WebSocket(_) | Self::Json(_) | Self::Io(_)
            )
    }
}

// ============================================================================
// Tests
// ============================================================================
