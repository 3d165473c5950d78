//! Browser process supervision.
//!
//! The [`Supervisor`] makes sure something is serving the DevTools port.
//! It launches a headless browser only when the port is free, tracks the
//! one process it launched, and stops it on [`Supervisor::terminate`] or
//! drop.
//!
//! # Lifecycle
//!
//! ```text
//! NotRunning ──ensure_running──► Launching ──port in use──► Running
//!     ▲                              │                         │
//!     │                              └──timeout / exit──► error│
//!     └──────────────── exit / terminate ◄─────────────────────┘
//! ```
//!
//! Reachability is probed by binding the port: if the bind fails with
//! "address in use", some process (ours or not) is serving it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::executable::{DEFAULT_ACQUIRE_COMMAND, resolve_executable};

// ============================================================================
// Constants
// ============================================================================

/// Default DevTools port.
pub const DEFAULT_PORT: u16 = 9222;

/// Default delay between reachability probes during startup.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of reachability probes before giving up.
pub const DEFAULT_STARTUP_ATTEMPTS: u32 = 100;

/// Default time between SIGTERM and SIGKILL.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_secs(5);

// ============================================================================
// SupervisorConfig
// ============================================================================

/// Launch and probe settings for a [`Supervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Host the port is probed on.
    pub host: String,
    /// DevTools port.
    pub port: u16,
    /// Explicit executable; resolved automatically when `None`.
    pub executable: Option<PathBuf>,
    /// Arguments appended after the fixed launch flags.
    pub extra_args: Vec<String>,
    /// Delay between reachability probes.
    pub poll_interval: Duration,
    /// Probes before [`Error::StartupTimeout`].
    pub startup_attempts: u32,
    /// Time between SIGTERM and SIGKILL on terminate.
    pub termination_grace: Duration,
    /// Program and arguments that download a browser.
    pub acquire_command: Vec<String>,
    /// Let the browser write to our stderr.
    pub inherit_stderr: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            executable: None,
            extra_args: Vec::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_attempts: DEFAULT_STARTUP_ATTEMPTS,
            termination_grace: DEFAULT_TERMINATION_GRACE,
            acquire_command: DEFAULT_ACQUIRE_COMMAND
                .iter()
                .map(|part| part.to_string())
                .collect(),
            inherit_stderr: false,
        }
    }
}

impl SupervisorConfig {
    /// Returns the full argument list passed to the browser.
    #[must_use]
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            format!("--remote-debugging-port={}", self.port),
        ];
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

// ============================================================================
// ProcessEvent
// ============================================================================

/// Lifecycle notification for the supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A browser was launched and its port became reachable.
    Spawned {
        /// Process id.
        pid: u32,
    },
    /// The browser exited on its own.
    Exited {
        /// Process id.
        pid: u32,
        /// Exit code, if it exited normally.
        code: Option<i32>,
    },
    /// The browser was stopped by [`Supervisor::terminate`].
    Terminated {
        /// Process id.
        pid: u32,
    },
}

/// Callback for [`ProcessEvent`]s.
pub type ProcessEventHandler = Box<dyn Fn(&ProcessEvent) + Send + Sync>;

// ============================================================================
// Types
// ============================================================================

/// The process launched by this supervisor.
struct TrackedProcess {
    /// Process id.
    pid: u32,
    /// Asks the watcher to stop the process.
    stop_tx: oneshot::Sender<()>,
    /// Task owning the [`Child`].
    watcher: JoinHandle<()>,
}

/// State shared with the watcher task.
#[derive(Default)]
struct Shared {
    /// Currently tracked process.
    tracked: Mutex<Option<TrackedProcess>>,
    /// Lifecycle callback.
    handler: Mutex<Option<ProcessEventHandler>>,
    /// Number of processes launched.
    spawn_count: AtomicU32,
}

impl Shared {
    fn notify(&self, event: ProcessEvent) {
        if let Some(handler) = self.handler.lock().as_ref() {
            handler(&event);
        }
    }

    /// Forgets the tracked process if it is `pid`.
    fn clear_if(&self, pid: u32) -> bool {
        let mut tracked = self.tracked.lock();
        if tracked.as_ref().is_some_and(|process| process.pid == pid) {
            *tracked = None;
            true
        } else {
            false
        }
    }
}

/// How startup polling ended.
enum Startup {
    /// Our process opened the port.
    Listening,
    /// Our process exited but another one serves the port.
    Superseded,
}

// ============================================================================
// Supervisor
// ============================================================================

/// Ensures a browser is serving the DevTools port.
///
/// At most one process is tracked at a time. Launches are serialized so
/// concurrent [`Supervisor::ensure_running`] calls start one browser.
///
/// Dropping a supervisor sends SIGTERM and returns without waiting; the
/// watcher task finishes the stop in the background. Await
/// [`Supervisor::terminate`] to know the process has exited.
pub struct Supervisor {
    /// Launch settings.
    config: SupervisorConfig,
    /// Serializes launch and terminate.
    lifecycle: tokio::sync::Mutex<()>,
    /// State shared with the watcher task.
    shared: Arc<Shared>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("port", &self.config.port)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Supervisor - Constructor
// ============================================================================

impl Supervisor {
    /// Creates a supervisor. Nothing is launched until
    /// [`Supervisor::ensure_running`].
    #[must_use]
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            lifecycle: tokio::sync::Mutex::new(()),
            shared: Arc::new(Shared::default()),
        }
    }
}

// ============================================================================
// Supervisor - Accessors
// ============================================================================

impl Supervisor {
    /// Returns the launch settings.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Returns the pid of the tracked process.
    #[inline]
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.shared.tracked.lock().as_ref().map(|process| process.pid)
    }

    /// Returns how many processes this supervisor has launched.
    #[inline]
    #[must_use]
    pub fn spawn_count(&self) -> u32 {
        self.shared.spawn_count.load(Ordering::SeqCst)
    }

    /// Sets the lifecycle callback, replacing any previous one.
    pub fn on_state_change<F>(&self, handler: F)
    where
        F: Fn(&ProcessEvent) + Send + Sync + 'static,
    {
        *self.shared.handler.lock() = Some(Box::new(handler));
    }
}

// ============================================================================
// Supervisor - Probes
// ============================================================================

impl Supervisor {
    /// Returns `true` if some process is serving the port.
    pub async fn is_endpoint_reachable(&self) -> bool {
        match TcpListener::bind((self.config.host.as_str(), self.config.port)).await {
            Ok(listener) => {
                drop(listener);
                false
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => true,
            Err(e) => {
                warn!(port = self.config.port, error = %e, "Port probe failed");
                false
            }
        }
    }

    /// Returns `true` if the tracked process exists.
    ///
    /// `false` when nothing is tracked.
    #[must_use]
    pub fn is_supervised_process_healthy(&self) -> bool {
        self.pid().is_some_and(process_alive)
    }
}

// ============================================================================
// Supervisor - Lifecycle
// ============================================================================

impl Supervisor {
    /// Launches a browser unless the port is already served.
    ///
    /// A no-op when the port is reachable or the tracked process is alive.
    ///
    /// # Errors
    ///
    /// - [`Error::ExecutableNotFound`] / [`Error::ProcessAcquisition`] if no executable resolves
    /// - [`Error::ProcessLaunchFailed`] if the process cannot start or exits early
    /// - [`Error::StartupTimeout`] if the port never becomes reachable
    pub async fn ensure_running(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;

        if self.is_endpoint_reachable().await {
            debug!(port = self.config.port, "DevTools port already served");
            return Ok(());
        }

        if self.is_supervised_process_healthy() {
            debug!(pid = ?self.pid(), "Supervised browser alive");
            return Ok(());
        }

        if let Some(stale) = self.shared.tracked.lock().take() {
            debug!(pid = stale.pid, "Forgetting dead browser process");
        }

        let executable =
            resolve_executable(self.config.executable.as_deref(), &self.config.acquire_command)
                .await?;

        let mut child = self.spawn(&executable)?;
        let pid = child
            .id()
            .ok_or_else(|| Error::process_launch_failed("Browser exited before reporting a pid"))?;
        self.shared.spawn_count.fetch_add(1, Ordering::SeqCst);

        info!(pid, port = self.config.port, executable = %executable.display(), "Browser process spawned");

        match self.wait_until_reachable(&mut child, pid).await? {
            Startup::Listening => {
                self.track(child, pid);
                info!(pid, port = self.config.port, "Browser ready");
                self.shared.notify(ProcessEvent::Spawned { pid });
            }
            Startup::Superseded => {
                info!(pid, port = self.config.port, "Another browser serves the port");
            }
        }

        Ok(())
    }

    /// Stops the tracked process: SIGTERM, then SIGKILL after the grace
    /// period. Returns once the process has exited. A no-op when nothing
    /// is tracked.
    pub async fn terminate(&self) {
        let _guard = self.lifecycle.lock().await;

        let tracked = self.shared.tracked.lock().take();
        let Some(tracked) = tracked else {
            return;
        };

        debug!(pid = tracked.pid, "Terminating browser process");
        let _ = tracked.stop_tx.send(());
        if let Err(e) = tracked.watcher.await {
            warn!(pid = tracked.pid, error = %e, "Process watcher failed");
        }
    }

    fn spawn(&self, executable: &std::path::Path) -> Result<Child> {
        let mut cmd = Command::new(executable);
        cmd.args(self.config.launch_args());

        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(
            if self.config.inherit_stderr {
                Stdio::inherit()
            } else {
                Stdio::null()
            },
        );

        #[cfg(unix)]
        cmd.process_group(0);

        // Last resort if the runtime goes away with the watcher still running.
        cmd.kill_on_drop(true);

        cmd.spawn().map_err(|e| {
            Error::process_launch_failed(format!("{}: {e}", executable.display()))
        })
    }

    async fn wait_until_reachable(&self, child: &mut Child, pid: u32) -> Result<Startup> {
        for attempt in 1..=self.config.startup_attempts {
            if self.is_endpoint_reachable().await {
                debug!(pid, attempt, "DevTools port reachable");
                return Ok(Startup::Listening);
            }

            if let Some(status) = child.try_wait()? {
                if self.is_endpoint_reachable().await {
                    return Ok(Startup::Superseded);
                }
                return Err(Error::process_launch_failed(format!(
                    "Browser exited with {status} before opening port {}",
                    self.config.port
                )));
            }

            sleep(self.config.poll_interval).await;
        }

        warn!(pid, attempts = self.config.startup_attempts, "Browser did not open its port");
        if let Err(e) = child.kill().await {
            debug!(pid, error = %e, "Failed to kill unresponsive browser");
        }

        Err(Error::startup_timeout(
            self.config.port,
            self.config.startup_attempts,
        ))
    }

    /// Hands `child` to a watcher task and records it as tracked.
    ///
    /// The record is stored under the `tracked` lock before the watcher can
    /// take it, so an immediate exit still clears it.
    fn track(&self, child: Child, pid: u32) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let mut tracked = self.shared.tracked.lock();

        let watcher = tokio::spawn(watch(
            child,
            pid,
            stop_rx,
            Arc::clone(&self.shared),
            self.config.termination_grace,
        ));

        *tracked = Some(TrackedProcess {
            pid,
            stop_tx,
            watcher,
        });
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(tracked) = self.shared.tracked.lock().take() {
            debug!(pid = tracked.pid, "Supervisor dropped, stopping browser");
            signal_terminate(tracked.pid);
        }
    }
}

// ============================================================================
// Watcher
// ============================================================================

/// Owns the child until it exits or is asked to stop.
async fn watch(
    mut child: Child,
    pid: u32,
    stop_rx: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    grace: Duration,
) {
    tokio::select! {
        status = child.wait() => {
            let code = status.as_ref().ok().and_then(ExitStatus::code);
            match &status {
                Ok(status) => warn!(pid, %status, "Browser process exited"),
                Err(e) => warn!(pid, error = %e, "Failed to wait for browser process"),
            }
            if shared.clear_if(pid) {
                shared.notify(ProcessEvent::Exited { pid, code });
            }
        }
        _ = stop_rx => {
            stop_gracefully(&mut child, pid, grace).await;
            shared.notify(ProcessEvent::Terminated { pid });
        }
    }
}

async fn stop_gracefully(child: &mut Child, pid: u32, grace: Duration) {
    signal_terminate(pid);

    match timeout(grace, child.wait()).await {
        Ok(Ok(status)) => info!(pid, %status, "Browser process terminated"),
        Ok(Err(e)) => debug!(pid, error = %e, "Failed to wait for browser process"),
        Err(_) => {
            warn!(pid, grace_ms = grace.as_millis() as u64, "Browser ignored SIGTERM, killing");
            if let Err(e) = child.kill().await {
                debug!(pid, error = %e, "Failed to kill browser process");
            }
        }
    }
}

// ============================================================================
// Signals
// ============================================================================

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::ESRCH | Errno::EPERM) => false,
        Err(e) => {
            debug!(pid, error = %e, "Health probe failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(unix)]
fn signal_terminate(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };

    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM not delivered");
    }
}

#[cfg(not(unix))]
fn signal_terminate(pid: u32) {
    debug!(pid, "Graceful termination unsupported on this platform");
}

// ============================================================================
// Tests
// ============================================================================
