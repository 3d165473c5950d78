//! Headless PDF - HTML to PDF rendering through a headless browser.
//!
//! This library drives a headless Chromium-family browser over the
//! DevTools protocol to turn HTML documents into PDF bytes.
//!
//! # Architecture
//!
//! ```text
//! Renderer ──► ConnectionPool ──► Session ──► ProtocolDriver ──► Transport
//!                   │                                              │
//!                   └── refused ──► Supervisor (launch browser)    └─► browser :9222
//! ```
//!
//! Key design principles:
//!
//! - One [`Session`](transport::Session) per worker, reused across renders
//! - Call ids start at 1 per session and strictly increase
//! - Calls never pipeline: a worker waits for each response in turn
//! - A failed session is dropped and the next render reconnects
//! - The browser is launched on demand and only when its port is free
//!
//! # Quick Start
//!
//! ```no_run
//! use headless_pdf::{PrintParams, Renderer, Result, WorkerId};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let renderer = Renderer::builder().build()?;
//!
//!     let pdf = renderer
//!         .render_to_pdf(WorkerId::new(1), "<h1>Hello</h1>", &PrintParams::default())
//!         .await?;
//!     std::fs::write("hello.pdf", pdf)?;
//!
//!     renderer.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`browser`] | Process supervision, executable lookup, DevTools HTTP endpoint |
//! | [`driver`] | [`Renderer`] facade and configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | DevTools message types and print parameters |
//! | [`transport`] | TCP, WebSocket, session and pool layers |

// ============================================================================
// Modules
// ============================================================================

/// Browser process supervision and DevTools HTTP endpoint.
pub mod browser;

/// Renderer facade and configuration.
///
/// Use [`Renderer::builder()`] to create a configured renderer.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// DevTools protocol message types.
pub mod protocol;

/// Connection layers from TCP up to the per-worker pool.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Browser types
pub use browser::{ProcessEvent, Supervisor, SupervisorConfig, TargetInfo};

// Driver types
pub use driver::{LaunchMode, Renderer, RendererBuilder, RendererConfig, Worker};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{CallId, TargetId, WorkerId};

// Protocol types
pub use protocol::{Margins, PrintParams};
