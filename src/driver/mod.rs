//! Renderer entry point.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Renderer`] | Renders HTML to PDF, owns the browser and session pool |
//! | [`RendererBuilder`] | Fluent configuration builder |
//! | [`RendererConfig`] | Complete configuration, also readable from the environment |
//! | [`Worker`] | Renderer handle bound to one worker id |
//!
//! # Example
//!
//! ```no_run
//! use headless_pdf::{Margins, PrintParams, Renderer, Result, WorkerId};
//!
//! # async fn example() -> Result<()> {
//! let renderer = Renderer::from_env()?;
//! let worker = renderer.worker(WorkerId::next());
//!
//! let params = PrintParams::default().with_margins(Margins::uniform(0.5));
//! let pdf = worker.render_to_pdf("<h1>Invoice</h1>", &params).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for renderer configuration.
pub mod builder;

/// Configuration types and environment parsing.
pub mod config;

/// Core renderer implementation.
pub mod core;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::RendererBuilder;
pub use config::{LaunchMode, RendererConfig};
pub use core::{BrowserConnector, Renderer, Worker};
