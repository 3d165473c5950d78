//! HTML to PDF renderer facade.
//!
//! The [`Renderer`] ties together the browser [`Supervisor`], the DevTools
//! endpoint and the per-worker [`ConnectionPool`].
//!
//! # Example
//!
//! ```no_run
//! use headless_pdf::{PrintParams, Renderer, WorkerId};
//!
//! # async fn example() -> headless_pdf::Result<()> {
//! let renderer = Renderer::builder().build()?;
//!
//! let pdf = renderer
//!     .render_to_pdf(WorkerId::new(1), "<h1>Hello</h1>", &PrintParams::default())
//!     .await?;
//! assert!(pdf.starts_with(b"%PDF-"));
//!
//! renderer.shutdown().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::browser::{DevToolsEndpoint, Supervisor};
use crate::error::Result;
use crate::identifiers::{TargetId, WorkerId};
use crate::protocol::PrintParams;
use crate::transport::{Connect, ConnectionPool, PooledSession, Session, SessionOptions};

use super::builder::RendererBuilder;
use super::config::{LaunchMode, RendererConfig};

// ============================================================================
// BrowserConnector
// ============================================================================

/// Opens sessions on new tabs of the configured endpoint.
///
/// In [`LaunchMode::Local`] a refused connection launches the browser once
/// and retries once.
pub struct BrowserConnector {
    /// DevTools HTTP endpoint.
    endpoint: DevToolsEndpoint,
    /// Present only in local mode.
    supervisor: Option<Arc<Supervisor>>,
    /// Options for new sessions.
    options: SessionOptions,
}

impl BrowserConnector {
    /// Creates a connector.
    #[must_use]
    pub fn new(
        endpoint: DevToolsEndpoint,
        supervisor: Option<Arc<Supervisor>>,
        options: SessionOptions,
    ) -> Self {
        Self {
            endpoint,
            supervisor,
            options,
        }
    }

    /// Opens a tab and connects to it. The tab is closed again if the
    /// session cannot be established.
    async fn open_session(&self) -> Result<Session> {
        let target = self.endpoint.new_target().await?;
        let id = target.id.clone();

        match Session::connect(target, self.options.clone()).await {
            Ok(session) => Ok(session),
            Err(e) => {
                debug!(target_id = %id, error = %e, "Session failed, closing its tab");
                self.close_tab(&id).await;
                Err(e)
            }
        }
    }

    async fn close_tab(&self, id: &TargetId) {
        if let Err(e) = self.endpoint.close_target(id).await {
            debug!(target_id = %id, error = %e, "Tab close request failed");
        }
    }
}

#[async_trait]
impl Connect for BrowserConnector {
    async fn connect(&self) -> Result<Session> {
        match self.open_session().await {
            Err(e) if e.is_refused() => match &self.supervisor {
                Some(supervisor) => {
                    info!(address = %self.endpoint.address(), "Endpoint refused, starting browser");
                    supervisor.ensure_running().await?;
                    self.open_session().await
                }
                None => Err(e),
            },
            other => other,
        }
    }

    async fn release(&self, session: Session) {
        let id = session.target().id.clone();
        session.close().await;
        self.close_tab(&id).await;
    }
}

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the renderer.
pub(crate) struct RendererInner {
    /// Validated configuration.
    pub config: RendererConfig,

    /// Browser process owner, in local mode.
    pub supervisor: Option<Arc<Supervisor>>,

    /// DevTools HTTP endpoint.
    pub endpoint: DevToolsEndpoint,

    /// Sessions by worker.
    pub pool: ConnectionPool,
}

// ============================================================================
// Renderer
// ============================================================================

/// Renders HTML documents to PDF through a headless browser.
///
/// Cheap to clone; clones share the browser and the session pool.
#[derive(Clone)]
pub struct Renderer {
    /// Shared inner state.
    pub(crate) inner: Arc<RendererInner>,
}

// ============================================================================
// Renderer - Display
// ============================================================================

impl fmt::Debug for Renderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderer")
            .field("endpoint", &self.inner.config.endpoint)
            .field("launch_mode", &self.inner.config.launch_mode)
            .field("sessions", &self.inner.pool.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Renderer - Public API
// ============================================================================

impl Renderer {
    /// Creates a configuration builder for the renderer.
    #[inline]
    #[must_use]
    pub fn builder() -> RendererBuilder {
        RendererBuilder::new()
    }

    /// Builds a renderer from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if a variable is invalid.
    pub fn from_env() -> Result<Self> {
        RendererBuilder::from_env()?.build()
    }

    /// Creates a renderer from a validated configuration.
    pub(crate) fn new(config: RendererConfig) -> Result<Self> {
        let endpoint = DevToolsEndpoint::new(&config.endpoint, config.session.connect_timeout)?;

        let supervisor = match config.launch_mode {
            LaunchMode::Local => Some(Arc::new(Supervisor::new(config.supervisor.clone()))),
            LaunchMode::Remote => None,
        };

        let connector = BrowserConnector::new(
            endpoint.clone(),
            supervisor.clone(),
            config.session.clone(),
        );
        let pool = ConnectionPool::new(Arc::new(connector));

        info!(endpoint = %config.endpoint, mode = ?config.launch_mode, "Renderer created");

        Ok(Self {
            inner: Arc::new(RendererInner {
                config,
                supervisor,
                endpoint,
                pool,
            }),
        })
    }

    /// Renders `html` to PDF bytes using the worker's session.
    ///
    /// # Errors
    ///
    /// Any error raised while launching, connecting or rendering. The
    /// worker's session is reset on failures that leave it unusable.
    pub async fn render_to_pdf(
        &self,
        worker: WorkerId,
        html: &str,
        params: &PrintParams,
    ) -> Result<Vec<u8>> {
        self.inner.pool.render_pdf(worker, html, params).await
    }

    /// Returns a handle bound to one worker id.
    #[inline]
    #[must_use]
    pub fn worker(&self, id: WorkerId) -> Worker {
        Worker {
            renderer: self.clone(),
            id,
        }
    }

    /// Lends the worker's session for custom protocol calls.
    ///
    /// # Errors
    ///
    /// Any error raised while launching or connecting.
    pub async fn session(&self, worker: WorkerId) -> Result<PooledSession<'_>> {
        self.inner.pool.acquire(worker).await
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RendererConfig {
        &self.inner.config
    }

    /// Returns the DevTools endpoint client.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &DevToolsEndpoint {
        &self.inner.endpoint
    }

    /// Returns the supervisor in local mode.
    #[inline]
    #[must_use]
    pub fn supervisor(&self) -> Option<&Supervisor> {
        self.inner.supervisor.as_deref()
    }

    /// Returns the session pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.inner.pool
    }

    /// Closes every pooled session and stops the supervised browser.
    ///
    /// Returns once the browser has exited. Dropping the last clone only
    /// signals the browser; call this to wait for it.
    pub async fn shutdown(&self) {
        info!("Renderer shutting down");
        self.inner.pool.clear().await;

        if let Some(supervisor) = &self.inner.supervisor {
            supervisor.terminate().await;
        }
        info!("Renderer shutdown complete");
    }
}

// ============================================================================
// Worker
// ============================================================================

/// A renderer handle bound to one worker id.
///
/// Must be used by one task at a time.
#[derive(Debug, Clone)]
pub struct Worker {
    renderer: Renderer,
    id: WorkerId,
}

impl Worker {
    /// Returns the worker id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Renders `html` to PDF bytes.
    ///
    /// # Errors
    ///
    /// See [`Renderer::render_to_pdf`].
    pub async fn render_to_pdf(&self, html: &str, params: &PrintParams) -> Result<Vec<u8>> {
        self.renderer.render_to_pdf(self.id, html, params).await
    }

    /// Drops this worker's session so the next render reconnects.
    pub async fn reset(&self) -> bool {
        self.renderer.pool().reset(self.id).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_returns_renderer_builder() {
        let _builder = Renderer::builder();
    }

    #[test]
    fn test_renderer_is_clone_send_sync() {
        fn assert_traits<T: Clone + Send + Sync + fmt::Debug>() {}
        assert_traits::<Renderer>();
        assert_traits::<Worker>();
    }

    #[test]
    fn test_remote_mode_has_no_supervisor() {
        let renderer = Renderer::builder()
            .remote("http://127.0.0.1:9")
            .build()
            .expect("build");
        assert!(renderer.supervisor().is_none());
        assert!(renderer.pool().is_empty());
    }

    #[test]
    fn test_local_mode_has_supervisor() {
        let renderer = Renderer::builder().port(9444).build().expect("build");
        let supervisor = renderer.supervisor().expect("supervisor");
        assert_eq!(supervisor.config().port, 9444);
        assert!(supervisor.pid().is_none());
    }

    #[test]
    fn test_worker_handle() {
        let renderer = Renderer::builder()
            .remote("http://127.0.0.1:9")
            .build()
            .expect("build");
        let worker = renderer.worker(WorkerId::new(7));
        assert_eq!(worker.id(), WorkerId::new(7));
    }

    #[tokio::test]
    async fn test_remote_refused_is_not_retried() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let renderer = Renderer::builder()
            .remote(format!("http://127.0.0.1:{port}"))
            .build()
            .expect("build");

        let err = renderer
            .render_to_pdf(WorkerId::new(1), "<p>x</p>", &PrintParams::default())
            .await
            .unwrap_err();
        assert!(err.is_refused(), "unexpected error: {err:?}");
        assert!(renderer.pool().is_empty());
    }
}
