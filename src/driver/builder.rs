//! Builder pattern for renderer configuration.
//!
//! Provides a fluent API for configuring and creating [`Renderer`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use headless_pdf::Renderer;
//!
//! # fn example() -> headless_pdf::Result<()> {
//! let renderer = Renderer::builder()
//!     .executable("/usr/bin/chromium")
//!     .arg("--no-sandbox")
//!     .call_timeout(Duration::from_secs(60))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};

use super::config::{LaunchMode, RendererConfig};
use super::core::Renderer;

// ============================================================================
// RendererBuilder
// ============================================================================

/// Builder for configuring a [`Renderer`] instance.
///
/// Use [`Renderer::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct RendererBuilder {
    /// Configuration being built.
    config: RendererConfig,
    /// Port set with [`RendererBuilder::port`].
    port: Option<u16>,
}

// ============================================================================
// RendererBuilder Implementation
// ============================================================================

impl RendererBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder seeded from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an environment variable is invalid.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(RendererConfig::from_env()?))
    }

    /// Creates a builder seeded from a complete configuration.
    #[inline]
    #[must_use]
    pub fn from_config(config: RendererConfig) -> Self {
        Self { config, port: None }
    }

    /// Connects to an existing endpoint and never launches a browser.
    ///
    /// # Arguments
    ///
    /// * `url` - DevTools HTTP endpoint (e.g., "http://chrome:9222")
    #[inline]
    #[must_use]
    pub fn remote(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = url.into();
        self.config.launch_mode = LaunchMode::Remote;
        self
    }

    /// Launches a local browser on `port` when nothing serves it.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self.config.launch_mode = LaunchMode::Local;
        self
    }

    /// Sets the browser executable.
    #[inline]
    #[must_use]
    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.supervisor.executable = Some(path.into());
        self
    }

    /// Appends one launch flag.
    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.config.supervisor.extra_args.push(arg.into());
        self
    }

    /// Appends several launch flags.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .supervisor
            .extra_args
            .extend(args.into_iter().map(Into::into));
        self
    }

    /// Enables debug output: browser stderr and message previews.
    #[inline]
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self.config.session.verbose = enabled;
        self.config.supervisor.inherit_stderr = enabled;
        self
    }

    /// Sets the bound on each protocol call.
    #[inline]
    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.call_timeout = timeout;
        self
    }

    /// Sets the bound on opening a session.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.session.connect_timeout = timeout;
        self
    }

    /// Sets startup polling: delay between probes and number of probes.
    #[inline]
    #[must_use]
    pub fn startup_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.config.supervisor.poll_interval = interval;
        self.config.supervisor.startup_attempts = attempts;
        self
    }

    /// Sets the time between SIGTERM and SIGKILL on shutdown.
    #[inline]
    #[must_use]
    pub fn termination_grace(mut self, grace: Duration) -> Self {
        self.config.supervisor.termination_grace = grace;
        self
    }

    /// Sets the command that downloads a browser when none is installed.
    #[must_use]
    pub fn acquire_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.supervisor.acquire_command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the validated configuration without building a renderer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if settings are inconsistent.
    pub fn into_config(self) -> Result<RendererConfig> {
        let mut config = self.config;

        if let Some(port) = self.port {
            config.endpoint = format!("http://{}:{port}", config.supervisor.host);
        }

        if config.launch_mode == LaunchMode::Local {
            let url = Url::parse(&config.endpoint).map_err(|e| {
                Error::config(format!("Invalid endpoint URL {}: {e}", config.endpoint))
            })?;
            if let Some(port) = url.port_or_known_default() {
                config.supervisor.port = port;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Builds the renderer with validation.
    ///
    /// No browser is launched until the first render.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if settings are inconsistent
    /// - [`Error::Http`] if the HTTP client cannot be created
    pub fn build(self) -> Result<Renderer> {
        Renderer::new(self.into_config()?)
    }
}

// ============================================================================
// Tests
// ============================================================================
