//! Browser executable resolution.
//!
//! Resolution order:
//!
//! 1. The configured path, which must exist
//! 2. The first existing well-known install location for this OS
//! 3. A download through the acquisition command
//!
//! The acquisition command prints one `name@version path` line per
//! installed browser. The last line whose path exists wins.

// ============================================================================
// Imports
// ============================================================================

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Command that downloads a headless browser build.
pub const DEFAULT_ACQUIRE_COMMAND: &[&str] = &[
    "npx",
    "--yes",
    "@puppeteer/browsers",
    "install",
    "chrome-headless-shell@stable",
];

/// `name@version path` lines in the acquisition output.
static INSTALLED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\S+@\S+[ \t]+(\S.*?)[ \t\r]*$").expect("installed-line regex compiles")
});

// ============================================================================
// Resolution
// ============================================================================

/// Finds a browser executable to launch.
///
/// # Arguments
///
/// * `configured` - Explicit path, used exclusively when set
/// * `acquire_command` - Program and arguments run when nothing is installed
///
/// # Errors
///
/// - [`Error::ExecutableNotFound`] if `configured` does not exist
/// - [`Error::ProcessAcquisition`] if no install is found and acquisition fails
pub async fn resolve_executable(
    configured: Option<&Path>,
    acquire_command: &[String],
) -> Result<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            debug!(path = %path.display(), "Using configured browser executable");
            return Ok(path.to_path_buf());
        }
        return Err(Error::executable_not_found(path));
    }

    if let Some(path) = default_executable_candidates()
        .into_iter()
        .find(|candidate| candidate.exists())
    {
        debug!(path = %path.display(), "Using installed browser executable");
        return Ok(path);
    }

    acquire_browser(acquire_command).await
}

/// Well-known install locations for the current OS.
#[must_use]
pub fn default_executable_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if cfg!(target_os = "macos") {
        candidates.push(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".into(),
        );
        candidates.push("/Applications/Chromium.app/Contents/MacOS/Chromium".into());
    } else if cfg!(target_os = "windows") {
        candidates.push(r"C:\Program Files\Google\Chrome\Application\chrome.exe".into());
        candidates.push(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe".into());
    } else {
        candidates.push("/usr/bin/google-chrome".into());
        candidates.push("/usr/bin/google-chrome-stable".into());
        candidates.push("/usr/bin/chromium".into());
        candidates.push("/usr/bin/chromium-browser".into());
    }

    candidates
}

/// Runs the acquisition command and returns the installed executable.
///
/// # Errors
///
/// Returns [`Error::ProcessAcquisition`] if the command is empty, fails to
/// run, exits unsuccessfully, or reports no existing path.
pub async fn acquire_browser(command: &[String]) -> Result<PathBuf> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| Error::process_acquisition("Acquisition command is empty"))?;

    info!(command = %command.join(" "), "No browser found, acquiring one");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| Error::process_acquisition(format!("Failed to run {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::process_acquisition(format!(
            "{program} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    match parse_installed_path(&stdout) {
        Some(path) => {
            info!(path = %path.display(), "Browser acquired");
            Ok(path)
        }
        None => {
            warn!(output = %stdout.trim(), "Acquisition output names no usable executable");
            Err(Error::process_acquisition(
                "Acquisition output names no existing executable",
            ))
        }
    }
}

/// Extracts the last existing executable path from acquisition output.
#[must_use]
pub fn parse_installed_path(output: &str) -> Option<PathBuf> {
    INSTALLED_LINE
        .captures_iter(output)
        .filter_map(|captures| captures.get(1))
        .map(|path| PathBuf::from(path.as_str()))
        .filter(|path| path.exists())
        .last()
}

// ============================================================================
// Tests
// ============================================================================
