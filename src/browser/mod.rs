//! Browser process and endpoint management.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Supervisor`] | Launches and tracks the headless browser |
//! | [`DevToolsEndpoint`] | HTTP API for opening and closing tabs |
//! | [`TargetInfo`] | Descriptor of one tab |
//!
//! # Example
//!
//! ```no_run
//! use headless_pdf::browser::{Supervisor, SupervisorConfig};
//!
//! # async fn example() -> headless_pdf::Result<()> {
//! let supervisor = Supervisor::new(SupervisorConfig::default());
//! supervisor.ensure_running().await?;
//! assert!(supervisor.is_endpoint_reachable().await);
//! supervisor.terminate().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Executable lookup and acquisition.
pub mod executable;

/// Process supervision.
pub mod process;

/// DevTools HTTP endpoint.
pub mod target;

// ============================================================================
// Re-exports
// ============================================================================

pub use executable::{DEFAULT_ACQUIRE_COMMAND, default_executable_candidates, resolve_executable};
pub use process::{ProcessEvent, ProcessEventHandler, Supervisor, SupervisorConfig};
pub use target::{BrowserVersion, DevToolsEndpoint, TargetInfo};
