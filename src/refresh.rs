//! Background catalog refresh
//!
//! Keeps the catalog cache warm by refetching on a fixed interval, whether or
//! not anyone is reading. Each cycle's result is sent over a tokio channel so
//! the presentation layer can re-render.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::cache::{CatalogCache, RefreshOutcome, DEFAULT_TTL};
use crate::data::Products;

/// Messages sent from the background refresh to the consumer
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// A refresh cycle finished
    Refreshed {
        /// The snapshot the cache is now serving
        products: Products,
        /// Whether the snapshot was replaced or kept
        outcome: RefreshOutcome,
    },
}

/// Configuration for the refresh schedule
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between refreshes
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_TTL,
            enabled: true,
        }
    }
}

impl RefreshConfig {
    /// Refreshes once per TTL of the given cache
    pub fn for_cache(cache: &CatalogCache) -> Self {
        Self {
            interval: cache.ttl(),
            enabled: true,
        }
    }
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    /// Signals the task to stop
    shutdown_tx: mpsc::Sender<()>,
    task: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Spawns the recurring refresh task for `cache`
    ///
    /// The first refresh happens one full interval after spawning; the read
    /// path is expected to have populated the cache already.
    pub fn spawn(cache: CatalogCache, config: RefreshConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = if config.enabled && !config.interval.is_zero() {
            let period = config.interval;
            Some(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let refreshed = cache.refresh().await;
                            send(&msg_tx, RefreshMessage::Refreshed {
                                products: refreshed.products,
                                outcome: refreshed.outcome,
                            });
                        }
                        _ = shutdown_rx.recv() => {
                            debug!("catalog refresh task stopping");
                            break;
                        }
                    }
                }
            }))
        } else {
            if config.enabled {
                warn!("refresh interval is zero, background refresh disabled");
            }
            None
        };

        Self {
            receiver: msg_rx,
            shutdown_tx,
            task,
        }
    }

    /// Waits for the next refresh message
    ///
    /// Returns `None` once the task has stopped and all messages are drained.
    pub async fn recv(&mut self) -> Option<RefreshMessage> {
        self.receiver.recv().await
    }

    /// Whether a background task was started
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stops the refresh task and waits for it to exit
    ///
    /// A refresh already in progress runs to completion first.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "catalog refresh task ended abnormally");
            }
        }
    }
}

/// Delivers a message without blocking the refresh loop on a slow consumer
fn send(tx: &mpsc::Sender<RefreshMessage>, message: RefreshMessage) {
    if let Err(e) = tx.try_send(message) {
        debug!(error = %e, "dropping refresh message");
    }
}

/// Checks for pending refresh messages without blocking
///
/// # Returns
/// * `Some(RefreshMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}
