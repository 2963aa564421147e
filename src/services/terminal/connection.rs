//! Reference-counted terminal connection shared by all workers.
//!
//! Every market data call acquires a guard; the first acquirer initializes
//! the connection and a background reaper tears it down once the count is
//! zero and the idle timeout has elapsed. Initialization and teardown are
//! serialized through one async lock so the connection is never
//! double-initialized and never closed while a guard is alive.

use crate::BoxError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

/// Low-level connect/disconnect operations against the terminal
#[async_trait::async_trait]
pub trait TerminalLink: Send + Sync {
    async fn connect(&self) -> Result<(), BoxError>;
    async fn disconnect(&self);
}

struct LinkState {
    connected: bool,
}

/// Shared handle over a [`TerminalLink`] with scoped acquisition
pub struct SharedTerminal {
    link: Arc<dyn TerminalLink>,
    state: AsyncMutex<LinkState>,
    active: AtomicUsize,
    last_activity: Mutex<Instant>,
    idle_timeout: Duration,
}

impl SharedTerminal {
    pub fn new(link: Arc<dyn TerminalLink>, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            link,
            state: AsyncMutex::new(LinkState { connected: false }),
            active: AtomicUsize::new(0),
            last_activity: Mutex::new(Instant::now()),
            idle_timeout,
        })
    }

    /// Acquire the connection for the duration of one call.
    ///
    /// Connects lazily on first use. The returned guard must be held across
    /// the call that needs the terminal; dropping it releases the reference.
    pub async fn acquire(self: &Arc<Self>) -> Result<TerminalGuard, BoxError> {
        // Count first so a reaper running concurrently sees the connection
        // as in use before it checks.
        self.active.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock().await;
        if !state.connected {
            if let Err(e) = self.link.connect().await {
                self.active.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
            state.connected = true;
            info!("terminal connection established");
        }
        drop(state);

        self.touch();
        debug!(
            active = self.active.load(Ordering::SeqCst),
            "terminal connection acquired"
        );
        Ok(TerminalGuard {
            shared: self.clone(),
        })
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Spawn the idle reaper. It closes the connection only when no guard is
    /// alive and the idle timeout has passed, and exits on the stop signal.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        mut stop: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let shared = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(60)) => {}
                    _ = stop.changed() => {}
                }
                if *stop.borrow() {
                    break;
                }

                let mut state = shared.state.lock().await;
                if state.connected
                    && shared.active.load(Ordering::SeqCst) == 0
                    && shared.idle_elapsed()
                {
                    info!(
                        idle_secs = shared.idle_timeout.as_secs(),
                        "closing idle terminal connection"
                    );
                    shared.link.disconnect().await;
                    state.connected = false;
                }
            }
        })
    }

    /// Force-close the connection if nobody is using it (shutdown path)
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.connected {
            if self.active.load(Ordering::SeqCst) > 0 {
                warn!("terminal still in use at shutdown, closing anyway");
            }
            self.link.disconnect().await;
            state.connected = false;
            info!("terminal connection closed");
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        let mut last = self
            .last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        *last = Instant::now();
    }

    fn idle_elapsed(&self) -> bool {
        let last = self
            .last_activity
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        last.elapsed() >= self.idle_timeout
    }
}

/// RAII reference to the shared terminal connection
pub struct TerminalGuard {
    shared: Arc<SharedTerminal>,
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        self.shared.active.fetch_sub(1, Ordering::SeqCst);
        self.shared.touch();
        debug!(
            active = self.shared.active.load(Ordering::SeqCst),
            "terminal connection released"
        );
    }
}
