//! DevTools HTTP endpoint and tab descriptors.
//!
//! The browser exposes a small HTTP API next to its WebSocket endpoints.
//! [`DevToolsEndpoint`] uses it to open and close tabs.
//!
//! | Request | Purpose |
//! |---------|---------|
//! | `PUT /json/new` | Open a blank tab, returns a [`TargetInfo`] |
//! | `GET /json/close/{id}` | Close a tab |
//! | `GET /json/version` | Browser and protocol version |

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;
use std::io::ErrorKind;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::TargetId;

// ============================================================================
// TargetInfo
// ============================================================================

/// Descriptor of one browser tab.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Tab id.
    pub id: TargetId,

    /// WebSocket URL for this tab's protocol session.
    pub web_socket_debugger_url: String,

    /// Target kind, usually `page`.
    #[serde(default, rename = "type")]
    pub kind: String,

    /// Current document URL.
    #[serde(default)]
    pub url: String,

    /// Current document title.
    #[serde(default)]
    pub title: String,
}

impl TargetInfo {
    /// Creates a page descriptor from an id and its WebSocket URL.
    #[must_use]
    pub fn new(id: impl Into<String>, web_socket_debugger_url: impl Into<String>) -> Self {
        Self {
            id: TargetId::new(id),
            web_socket_debugger_url: web_socket_debugger_url.into(),
            kind: "page".to_string(),
            url: String::new(),
            title: String::new(),
        }
    }
}

// ============================================================================
// BrowserVersion
// ============================================================================

/// Reply of `GET /json/version`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrowserVersion {
    /// Product and version, e.g. `HeadlessChrome/131.0.6778.85`.
    #[serde(rename = "Browser")]
    pub browser: String,

    /// DevTools protocol version.
    #[serde(rename = "Protocol-Version")]
    pub protocol_version: String,

    /// User agent string.
    #[serde(default, rename = "User-Agent")]
    pub user_agent: String,

    /// Browser-level WebSocket URL.
    #[serde(default, rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

// ============================================================================
// DevToolsEndpoint
// ============================================================================

/// HTTP client for the browser's DevTools endpoint.
#[derive(Debug, Clone)]
pub struct DevToolsEndpoint {
    /// Base URL, e.g. `http://127.0.0.1:9222`.
    base: Url,
    /// HTTP client.
    client: reqwest::Client,
    /// Bound on each request.
    request_timeout: Duration,
}

impl DevToolsEndpoint {
    /// Creates a client for `base`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `base` is not an `http` URL with a host
    /// - [`Error::Http`] if the HTTP client cannot be built
    pub fn new(base: &str, request_timeout: Duration) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| Error::config(format!("Invalid endpoint URL {base}: {e}")))?;

        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(Error::config(format!(
                "Endpoint URL must be http(s) with a host: {base}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base,
            client,
            request_timeout,
        })
    }

    /// Returns the base URL.
    #[inline]
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Returns `host:port` of the endpoint.
    #[must_use]
    pub fn address(&self) -> String {
        let host = self.base.host_str().unwrap_or("127.0.0.1");
        match self.base.port_or_known_default() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Opens a new blank tab.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionRefused`] if nothing listens at the endpoint
    /// - [`Error::ConnectionTimeout`] if the request times out
    /// - [`Error::Http`] for other HTTP failures
    pub async fn new_target(&self) -> Result<TargetInfo> {
        let url = self.url("json/new");
        let target: TargetInfo = self
            .client
            .put(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?
            .error_for_status()?
            .json()
            .await?;

        debug!(target_id = %target.id, ws = %target.web_socket_debugger_url, "Tab opened");
        Ok(target)
    }

    /// Closes a tab.
    ///
    /// # Errors
    ///
    /// Same as [`DevToolsEndpoint::new_target`].
    pub async fn close_target(&self, id: &TargetId) -> Result<()> {
        let url = self.url(&format!("json/close/{id}"));
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?
            .error_for_status()?;

        debug!(target_id = %id, "Tab closed");
        Ok(())
    }

    /// Queries browser and protocol version.
    ///
    /// # Errors
    ///
    /// Same as [`DevToolsEndpoint::new_target`].
    pub async fn version(&self) -> Result<BrowserVersion> {
        let url = self.url("json/version");
        let version = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?
            .error_for_status()?
            .json()
            .await?;

        Ok(version)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base.as_str().trim_end_matches('/'))
    }

    fn map_request_error(&self, e: reqwest::Error) -> Error {
        if e.is_connect() {
            if !is_refused(&e) {
                debug!(address = %self.address(), error = %e, "Endpoint unreachable");
            }
            Error::connection_refused(self.address())
        } else if e.is_timeout() {
            Error::connection_timeout(self.request_timeout.as_millis() as u64)
        } else {
            Error::Http(e)
        }
    }
}

/// Returns `true` if an `ECONNREFUSED` is anywhere in the error chain.
fn is_refused(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && io.kind() == ErrorKind::ConnectionRefused
        {
            return true;
        }
        source = cause.source();
    }
    false
}

// ============================================================================
// Tests
// ============================================================================
