//! Per-worker session pool.
//!
//! Holds at most one [`Session`] per [`WorkerId`]. Sessions are created
//! lazily on first use and reused until a failure closes them.
//!
//! A lease that drops with a session that [needs a reset](Session::needs_reset)
//! does not return it to its slot. The session is parked and released on
//! the next [`ConnectionPool::acquire`], [`ConnectionPool::reset`] or
//! [`ConnectionPool::clear`], since releasing needs an async context.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           ConnectionPool                │
//! │  ┌─────────────────────────────────┐   │
//! │  │ worker-1 → Session (tab A)      │   │
//! │  │ worker-2 → Session (tab B)      │   │
//! │  │ worker-3 → (none yet)           │   │
//! │  └─────────────────────────────────┘   │
//! │               │ miss                    │
//! │               ▼                         │
//! │         dyn Connect                     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A worker id must be used by one task at a time. The pool never lends
//! a session to two workers.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::identifiers::WorkerId;
use crate::protocol::PrintParams;

use super::session::Session;

// ============================================================================
// Connect
// ============================================================================

/// Creates and releases sessions for the pool.
#[async_trait]
pub trait Connect: Send + Sync {
    /// Opens a new session on a fresh tab.
    ///
    /// # Errors
    ///
    /// Any error raised while locating the browser or opening the session.
    async fn connect(&self) -> Result<Session>;

    /// Releases a session the pool no longer holds.
    async fn release(&self, session: Session) {
        session.close().await;
    }
}

// ============================================================================
// ConnectionPool
// ============================================================================

/// Mapping from worker to its current session.
pub struct ConnectionPool {
    /// Opens sessions on a miss.
    connector: Arc<dyn Connect>,

    /// Idle sessions by worker.
    slots: Mutex<FxHashMap<WorkerId, Session>>,

    /// Sessions dropped by leases, waiting for release.
    retired: Mutex<Vec<Session>>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("sessions", &self.len())
            .field("retired", &self.retired.lock().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionPool - Constructor
// ============================================================================

impl ConnectionPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new(connector: Arc<dyn Connect>) -> Self {
        Self {
            connector,
            slots: Mutex::new(FxHashMap::default()),
            retired: Mutex::new(Vec::new()),
        }
    }
}

// ============================================================================
// ConnectionPool - Public API
// ============================================================================

impl ConnectionPool {
    /// Returns the number of idle sessions held.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns `true` if no sessions are held.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Returns `true` if `worker` has an idle session.
    #[inline]
    #[must_use]
    pub fn contains(&self, worker: WorkerId) -> bool {
        self.slots.lock().contains_key(&worker)
    }

    /// Lends the worker's session, creating one if none is usable.
    ///
    /// The session goes back to the pool when the lease drops, unless it
    /// needs a reset by then.
    ///
    /// # Errors
    ///
    /// Any error of [`Connect::connect`].
    pub async fn acquire(&self, worker: WorkerId) -> Result<PooledSession<'_>> {
        self.release_retired().await;
        let existing = self.slots.lock().remove(&worker);

        let session = match existing {
            Some(session) if !session.needs_reset() => {
                debug!(%worker, "Reusing session");
                session
            }
            Some(session) => {
                debug!(%worker, "Discarding unusable session");
                self.connector.release(session).await;
                self.open(worker).await?
            }
            None => self.open(worker).await?,
        };

        Ok(PooledSession {
            pool: self,
            worker,
            session: Some(session),
        })
    }

    /// Loads `html` in the worker's session and prints it.
    ///
    /// On any failure that leaves the session unusable, the session is
    /// discarded so the next call for this worker starts fresh.
    ///
    /// # Errors
    ///
    /// Any error of [`ConnectionPool::acquire`] or [`Session::render_pdf`].
    pub async fn render_pdf(
        &self,
        worker: WorkerId,
        html: &str,
        params: &PrintParams,
    ) -> Result<Vec<u8>> {
        let mut session = self.acquire(worker).await?;

        match session.render_pdf(html, params).await {
            Ok(pdf) => {
                debug!(%worker, bytes = pdf.len(), "Rendered PDF");
                Ok(pdf)
            }
            Err(e) => {
                if e.requires_reset() {
                    warn!(%worker, error = %e, "Render failed, resetting session");
                    session.discard().await;
                }
                Err(e)
            }
        }
    }

    /// Drops the worker's session so the next use reconnects.
    ///
    /// Returns `true` if a session was held.
    pub async fn reset(&self, worker: WorkerId) -> bool {
        self.release_retired().await;
        let removed = self.slots.lock().remove(&worker);

        match removed {
            Some(session) => {
                debug!(%worker, "Session reset");
                self.connector.release(session).await;
                true
            }
            None => false,
        }
    }

    /// Closes every held session.
    pub async fn clear(&self) {
        self.release_retired().await;
        let sessions: Vec<_> = {
            let mut slots = self.slots.lock();
            slots.drain().collect()
        };

        let count = sessions.len();
        for (worker, session) in sessions {
            debug!(%worker, "Closing session");
            self.connector.release(session).await;
        }

        info!(count, "ConnectionPool cleared");
    }

    async fn open(&self, worker: WorkerId) -> Result<Session> {
        let session = self.connector.connect().await?;
        info!(%worker, target_id = %session.target().id, "Session opened");
        Ok(session)
    }

    async fn release_retired(&self) {
        let retired: Vec<_> = self.retired.lock().drain(..).collect();
        for session in retired {
            debug!(target_id = %session.target().id, "Releasing retired session");
            self.connector.release(session).await;
        }
    }

    fn put_back(&self, worker: WorkerId, session: Session) {
        if session.needs_reset() {
            debug!(%worker, state = %session.state(), "Retiring session that needs a reset");
            self.retired.lock().push(session);
            return;
        }

        let replaced = self.slots.lock().insert(worker, session);
        if replaced.is_some() {
            warn!(%worker, "Worker returned a second session, dropping the older one");
        }
    }
}

// ============================================================================
// PooledSession
// ============================================================================

/// A session lent to one worker.
///
/// Dereferences to [`Session`]. Returns the session to the pool on drop.
pub struct PooledSession<'a> {
    pool: &'a ConnectionPool,
    worker: WorkerId,
    session: Option<Session>,
}

impl PooledSession<'_> {
    /// Returns the worker this lease belongs to.
    #[inline]
    #[must_use]
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Releases the session instead of returning it to the pool.
    pub async fn discard(mut self) {
        if let Some(session) = self.session.take() {
            self.pool.connector.release(session).await;
        }
    }
}

impl fmt::Debug for PooledSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("worker", &self.worker)
            .field("session", &self.session)
            .finish()
    }
}

impl Deref for PooledSession<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        match &self.session {
            Some(session) => session,
            None => unreachable!("session is only taken on drop or discard"),
        }
    }
}

impl DerefMut for PooledSession<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        match &mut self.session {
            Some(session) => session,
            None => unreachable!("session is only taken on drop or discard"),
        }
    }
}

impl Drop for PooledSession<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.put_back(self.worker, session);
        }
    }
}
