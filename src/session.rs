use crate::config::{RetryPolicy, SessionConfig};
use crate::device::{DeviceSession, SessionConnector};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// How long `shutdown` waits for the connect loop to wind down
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Sleep for `duration` unless `token` fires first.
///
/// Returns `false` if the token was cancelled before or during the sleep.
pub(crate) async fn pause(token: &CancellationToken, duration: Duration) -> bool {
    if token.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = token.cancelled() => false,
        _ = sleep(duration) => !token.is_cancelled(),
    }
}

/// A published session together with its identity
#[derive(Clone)]
pub struct SessionHandle {
    generation: u64,
    session: Arc<dyn DeviceSession>,
}

impl SessionHandle {
    /// Identity of the session; every reconnect gets a higher number
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session(&self) -> &Arc<dyn DeviceSession> {
        &self.session
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Single-writer, multi-reader cell holding the live session
///
/// Replacing the handle is one atomic swap; readers either see the old
/// handle, the new one, or nothing.
#[derive(Clone)]
pub struct SessionCell {
    tx: Arc<watch::Sender<Option<SessionHandle>>>,
    next_generation: Arc<AtomicU64>,
}

impl SessionCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Live session, if any
    pub fn current(&self) -> Option<SessionHandle> {
        self.tx.borrow().clone()
    }

    /// Watch the cell on behalf of a reconciler
    pub(crate) fn watch(&self, running: CancellationToken, poll: Duration, debug: bool) -> SessionWatch {
        SessionWatch {
            rx: self.tx.subscribe(),
            running,
            poll,
            debug,
        }
    }

    fn publish(&self, session: Arc<dyn DeviceSession>) -> SessionHandle {
        let handle = SessionHandle {
            generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            session,
        };
        self.tx.send_replace(Some(handle.clone()));
        handle
    }

    fn take(&self) -> Option<SessionHandle> {
        self.tx.send_replace(None)
    }

    /// Remove the handle only if it is still the one with `generation`
    fn retract(&self, generation: u64) -> bool {
        self.tx.send_if_modified(|current| match current {
            Some(handle) if handle.generation == generation => {
                *current = None;
                true
            }
            _ => false,
        })
    }
}

impl Default for SessionCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the [`SessionCell`] used by reconcilers
pub(crate) struct SessionWatch {
    rx: watch::Receiver<Option<SessionHandle>>,
    running: CancellationToken,
    poll: Duration,
    debug: bool,
}

impl SessionWatch {
    /// Wait until a session is live.
    ///
    /// Returns `None` as soon as `cancel` fires or the controller is torn
    /// down. Wakes on every publish, and at least every poll interval.
    pub(crate) async fn wait_live(&mut self, cancel: &CancellationToken, purpose: &str) -> Option<SessionHandle> {
        loop {
            if cancel.is_cancelled() || self.running.is_cancelled() {
                return None;
            }

            let current = self.rx.borrow_and_update().clone();
            if let Some(handle) = current {
                return Some(handle);
            }

            if self.debug {
                tracing::debug!("waiting for the OBS connection before {}...", purpose);
            }

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = self.running.cancelled() => return None,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = sleep(self.poll) => {}
            }
        }
    }
}

/// Keeps one session with the device alive
///
/// Connect failures are retried forever with a fixed delay; an unexpected
/// close retracts the handle and restarts the connect loop. Only
/// [`shutdown`](SessionManager::shutdown) (or dropping the manager) stops it.
pub struct SessionManager {
    config: SessionConfig,
    cell: SessionCell,
    running: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionManager {
    /// Start the connect loop, publishing into `cell`
    ///
    /// Must be called from within a tokio runtime. The loop also stops when
    /// `parent` is cancelled.
    pub fn start(
        config: SessionConfig,
        connector: Arc<dyn SessionConnector>,
        cell: SessionCell,
        policy: RetryPolicy,
        parent: &CancellationToken,
        debug: bool,
    ) -> Self {
        let running = parent.child_token();

        let task = tokio::spawn(run_session_loop(
            config.clone(),
            connector,
            cell.clone(),
            policy,
            running.clone(),
            debug,
        ));

        Self {
            config,
            cell,
            running,
            task: Some(task),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Live session, if any
    pub fn current(&self) -> Option<SessionHandle> {
        self.cell.current()
    }

    /// Stop the connect loop and close the live session
    pub async fn shutdown(&mut self) {
        tracing::info!("Disconnecting from {}", self.config.url());
        self.running.cancel();

        if let Some(task) = self.task.take() {
            // Give it a moment to close its session
            let _ = timeout(SHUTDOWN_GRACE, task).await;
        }
        if let Some(handle) = self.cell.take() {
            handle.session().close().await;
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.running.cancel();
    }
}

async fn run_session_loop(
    config: SessionConfig,
    connector: Arc<dyn SessionConnector>,
    cell: SessionCell,
    policy: RetryPolicy,
    running: CancellationToken,
    debug: bool,
) {
    let url = config.url();

    loop {
        // Retry until connected or torn down
        let session = loop {
            if running.is_cancelled() {
                return;
            }
            if debug {
                tracing::debug!("trying to connect to '{}'...", url);
            }

            let attempt = tokio::select! {
                _ = running.cancelled() => return,
                attempt = connector.open(&config) => attempt,
            };
            match attempt {
                Ok(session) => break session,
                Err(e) => {
                    if debug {
                        tracing::debug!("connection to '{}' failed: {}", url, e);
                    }
                    if !pause(&running, policy.connect_retry()).await {
                        return;
                    }
                }
            }
        };

        // Watch for the close before anyone can see the session
        let closed = session.closed();

        if running.is_cancelled() {
            tracing::info!("Torn down while connecting, closing the new session");
            session.close().await;
            return;
        }

        let handle = cell.publish(session);
        tracing::info!("Connected to {} (session {})", url, handle.generation());

        tokio::select! {
            _ = running.cancelled() => {
                cell.retract(handle.generation());
                handle.session().close().await;
                return;
            }
            _ = closed.cancelled() => {
                tracing::warn!("Connection to {} closed unexpectedly", url);
                cell.retract(handle.generation());
                if !pause(&running, policy.reconnect_delay()).await {
                    return;
                }
            }
        }
    }
}
