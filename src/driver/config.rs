//! Renderer configuration.
//!
//! | Setting | Environment variable | Default |
//! |---------|----------------------|---------|
//! | Endpoint URL | `HEADLESS_CHROME_URL` | `http://127.0.0.1:9222` |
//! | Executable | `HEADLESS_CHROME_PATH` | resolved automatically |
//! | Extra launch flags | `HEADLESS_CHROME_ARGS` | none |
//! | Debug output | `HEADLESS_PDF_DEBUG` | off |
//!
//! Setting `HEADLESS_CHROME_URL` selects [`LaunchMode::Remote`]: the
//! renderer only connects and never launches a browser.

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::path::PathBuf;

use url::Url;

use crate::browser::SupervisorConfig;
use crate::error::{Error, Result};
use crate::transport::SessionOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default DevTools endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9222";

/// Environment variable naming a remote endpoint.
pub const ENV_URL: &str = "HEADLESS_CHROME_URL";

/// Environment variable naming the browser executable.
pub const ENV_PATH: &str = "HEADLESS_CHROME_PATH";

/// Environment variable with extra launch flags.
pub const ENV_ARGS: &str = "HEADLESS_CHROME_ARGS";

/// Environment variable enabling debug output.
pub const ENV_DEBUG: &str = "HEADLESS_PDF_DEBUG";

// ============================================================================
// LaunchMode
// ============================================================================

/// Whether the renderer may launch a browser itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LaunchMode {
    /// Launch a local browser when nothing serves the endpoint.
    #[default]
    Local,
    /// Only connect to an existing endpoint.
    Remote,
}

// ============================================================================
// RendererConfig
// ============================================================================

/// Complete configuration of a [`Renderer`](super::Renderer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererConfig {
    /// DevTools HTTP endpoint.
    pub endpoint: String,
    /// Launch policy.
    pub launch_mode: LaunchMode,
    /// Process settings, used in [`LaunchMode::Local`].
    pub supervisor: SupervisorConfig,
    /// Session timeouts and logging.
    pub session: SessionOptions,
    /// Debug output.
    pub debug: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            launch_mode: LaunchMode::Local,
            supervisor: SupervisorConfig::default(),
            session: SessionOptions::default(),
            debug: false,
        }
    }
}

impl RendererConfig {
    /// Reads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        let vars = EnvVars {
            url: non_empty_var(ENV_URL),
            path: non_empty_var(ENV_PATH),
            args: non_empty_var(ENV_ARGS),
            debug: non_empty_var(ENV_DEBUG),
        };
        vars.into_config()
    }

    /// Checks that settings agree with each other.
    ///
    /// In [`LaunchMode::Local`] the endpoint must be on loopback and its
    /// port must be the port the browser is launched with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| Error::config(format!("Invalid endpoint URL {}: {e}", self.endpoint)))?;

        if self.session.call_timeout.is_zero() {
            return Err(Error::config("Call timeout must be greater than zero"));
        }
        if self.session.connect_timeout.is_zero() {
            return Err(Error::config("Connect timeout must be greater than zero"));
        }

        if self.launch_mode == LaunchMode::Remote {
            return Ok(());
        }

        if self.supervisor.startup_attempts == 0 {
            return Err(Error::config("Startup attempts must be at least 1"));
        }

        let host = url.host_str().unwrap_or_default();
        if !is_loopback(host) {
            return Err(Error::config(format!(
                "Local launch requires a loopback endpoint, got {host}. \
                 Use remote mode for other hosts."
            )));
        }

        if url.port_or_known_default() != Some(self.supervisor.port) {
            return Err(Error::config(format!(
                "Endpoint port does not match launch port {}",
                self.supervisor.port
            )));
        }

        Ok(())
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Raw values of the configuration variables.
#[derive(Debug, Default)]
pub(crate) struct EnvVars {
    pub url: Option<String>,
    pub path: Option<String>,
    pub args: Option<String>,
    pub debug: Option<String>,
}

impl EnvVars {
    pub(crate) fn into_config(self) -> Result<RendererConfig> {
        let mut config = RendererConfig::default();

        if let Some(url) = self.url {
            Url::parse(&url)
                .map_err(|e| Error::config(format!("{ENV_URL} is not a URL ({url}): {e}")))?;
            config.endpoint = url;
            config.launch_mode = LaunchMode::Remote;
        }

        if let Some(path) = self.path {
            config.supervisor.executable = Some(PathBuf::from(path));
        }

        if let Some(args) = self.args {
            config.supervisor.extra_args = args.split_whitespace().map(str::to_string).collect();
        }

        if let Some(debug) = self.debug {
            config.debug = parse_flag(ENV_DEBUG, &debug)?;
            config.session.verbose = config.debug;
            config.supervisor.inherit_stderr = config.debug;
        }

        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::config(format!("{name} must be a boolean, got {other}"))),
    }
}

pub(crate) fn is_loopback(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
}

// ============================================================================
// Tests
// ============================================================================
