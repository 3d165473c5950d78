//! DevTools protocol message types.
//!
//! This module defines the JSON messages exchanged with the browser and
//! the parameters of the print command.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Call` | Local → Remote | Method call with a session-unique id |
//! | `Response` | Remote → Local | Result or error for one call id |
//! | `Event` | Remote → Local | Notification without an id |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Call, Response, Event and inbound decoding |
//! | `print` | `Page.printToPDF` parameters and data URLs |

// ============================================================================
// Submodules
// ============================================================================

/// Call, Response and Event message types.
pub mod message;

/// Print parameters.
pub mod print;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Call, Event, Inbound, RemoteFault, Response};
pub use print::{Margins, PrintParams, data_url_for_html};

// ============================================================================
// Method Names
// ============================================================================

/// Enables page lifecycle events on a fresh session.
pub const PAGE_ENABLE: &str = "Page.enable";

/// Navigates the tab.
pub const PAGE_NAVIGATE: &str = "Page.navigate";

/// Prints the current document.
pub const PAGE_PRINT_TO_PDF: &str = "Page.printToPDF";

/// Emitted once the navigated frame finished loading.
pub const FRAME_STOPPED_LOADING: &str = "Page.frameStoppedLoading";
