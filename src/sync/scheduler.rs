//! Background sync scheduler.
//!
//! Decides *when* [`SyncEngine::sync_all`] runs for one owner. A single
//! tokio task owns the schedule and reacts to:
//!
//! - local changes published on the store's [`ChangeBus`] (debounced),
//! - connectivity coming back (short reconnect delay),
//! - the app returning to the foreground (immediate),
//! - a periodic interval tick (safety net),
//! - explicit [`SyncScheduler::sync_now`] requests.
//!
//! At most one sync runs at a time. Triggers that arrive while a sync is in
//! flight are folded into a single follow-up sync, debounced from the moment
//! the in-flight one finishes.

use std::future::pending;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::storage::{lock_store, ChangeOrigin, Subscription};

use super::engine::SyncEngine;
use super::gateway::RemoteGateway;
use super::types::SyncResult;

/// Timing knobs for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Start in the enabled state
    pub enabled: bool,
    /// Quiet period after the last local change before syncing
    pub debounce: Duration,
    /// Periodic sync while online
    pub interval: Duration,
    /// Delay before syncing after connectivity returns
    pub reconnect_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce: Duration::from_secs(3),
            interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_millis(500),
        }
    }
}

/// Observable scheduler state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub is_syncing: bool,
    pub is_online: bool,
    pub is_enabled: bool,
    /// End of the last completed sync (Unix milliseconds)
    pub last_sync_at: Option<i64>,
    /// Pending records for the owner, refreshed on every change and sync
    pub pending_count: usize,
    /// First error of the last completed sync
    pub last_error: Option<String>,
}

enum Trigger {
    Changed { local: bool },
    Reconnected,
    WentOffline,
    Foreground,
    Enabled(bool),
    SyncNow(oneshot::Sender<Option<SyncResult>>),
    Shutdown,
}

/// Handle to a running scheduler for one owner.
///
/// Must be created inside a tokio runtime.
pub struct SyncScheduler {
    owner_id: String,
    status: Arc<Mutex<SchedulerStatus>>,
    tx: mpsc::UnboundedSender<Trigger>,
    subscription: Subscription,
    task: Option<JoinHandle<()>>,
}

impl SyncScheduler {
    /// Subscribe to the engine's store and start the schedule loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial pending count cannot be read.
    pub fn start<G>(engine: Arc<SyncEngine<G>>, owner_id: &str, config: SchedulerConfig) -> Result<Self>
    where
        G: RemoteGateway + 'static,
    {
        let (bus, pending_count) = {
            let store = lock_store(engine.store())?;
            (store.changes().clone(), store.count_pending(owner_id)?)
        };

        let status = Arc::new(Mutex::new(SchedulerStatus {
            is_online: true,
            is_enabled: config.enabled,
            pending_count,
            ..SchedulerStatus::default()
        }));

        let (tx, rx) = mpsc::unbounded_channel();

        let listener_tx = tx.clone();
        let owner = owner_id.to_string();
        let subscription = bus.subscribe(move |event| {
            if event.owner_id == owner {
                let _ = listener_tx.send(Trigger::Changed {
                    local: event.origin == ChangeOrigin::Local,
                });
            }
        });

        let schedule = Schedule {
            engine,
            owner_id: owner_id.to_string(),
            config,
            status: Arc::clone(&status),
            debounce_at: None,
            in_flight: None,
            waiters: Vec::new(),
            rerun: false,
        };
        let task = tokio::spawn(schedule.run(rx, pending_count > 0));

        info!(owner = owner_id, enabled = config.enabled, "Sync scheduler started");

        Ok(Self {
            owner_id: owner_id.to_string(),
            status,
            tx,
            subscription,
            task: Some(task),
        })
    }

    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        lock_status(&self.status).clone()
    }

    /// Report connectivity. Going from offline to online schedules a sync
    /// after the reconnect delay.
    pub fn set_online(&self, online: bool) {
        let was = std::mem::replace(&mut lock_status(&self.status).is_online, online);
        match (was, online) {
            (false, true) => self.send(Trigger::Reconnected),
            (true, false) => self.send(Trigger::WentOffline),
            _ => {}
        }
    }

    /// The app came to the foreground; sync right away when possible.
    pub fn notify_foreground(&self) {
        self.send(Trigger::Foreground);
    }

    /// Turn background sync on or off. Pending counts keep updating while off.
    pub fn set_enabled(&self, enabled: bool) {
        lock_status(&self.status).is_enabled = enabled;
        self.send(Trigger::Enabled(enabled));
    }

    /// Run a sync now and wait for its result.
    ///
    /// Returns `None` without syncing when offline, disabled, or a sync is
    /// already running.
    pub async fn sync_now(&self) -> Option<SyncResult> {
        let (reply, result) = oneshot::channel();
        if self.tx.send(Trigger::SyncNow(reply)).is_err() {
            return None;
        }
        result.await.ok().flatten()
    }

    /// Stop listening for changes and end the schedule loop, letting an
    /// in-flight sync finish first.
    pub async fn shutdown(mut self) {
        self.subscription.unsubscribe();
        self.send(Trigger::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(owner = %self.owner_id, error = %e, "Sync scheduler task failed");
            }
        }
    }

    fn send(&self, trigger: Trigger) {
        if self.tx.send(trigger).is_err() {
            debug!(owner = %self.owner_id, "Sync scheduler already stopped");
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
        let _ = self.tx.send(Trigger::Shutdown);
    }
}

fn lock_status(status: &Mutex<SchedulerStatus>) -> MutexGuard<'_, SchedulerStatus> {
    status
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// State owned by the schedule loop.
struct Schedule<G> {
    engine: Arc<SyncEngine<G>>,
    owner_id: String,
    config: SchedulerConfig,
    status: Arc<Mutex<SchedulerStatus>>,
    /// Armed debounce or reconnect timer
    debounce_at: Option<Instant>,
    in_flight: Option<JoinHandle<SyncResult>>,
    waiters: Vec<oneshot::Sender<Option<SyncResult>>>,
    /// A trigger arrived during the in-flight sync
    rerun: bool,
}

impl<G: RemoteGateway + 'static> Schedule<G> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Trigger>, has_pending: bool) {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if has_pending && self.can_sync() {
            self.arm(self.config.debounce);
        }

        loop {
            tokio::select! {
                trigger = rx.recv() => match trigger {
                    None | Some(Trigger::Shutdown) => break,
                    Some(trigger) => self.handle(trigger),
                },
                () = wait_until(self.debounce_at), if self.debounce_at.is_some() => {
                    self.debounce_at = None;
                    if self.can_sync() {
                        self.start_sync("debounce");
                    }
                }
                _ = ticker.tick() => {
                    if self.can_sync() {
                        if self.in_flight.is_some() {
                            self.rerun = true;
                        } else {
                            self.start_sync("interval");
                        }
                    }
                }
                joined = join(&mut self.in_flight), if self.in_flight.is_some() => {
                    self.in_flight = None;
                    self.finish(joined);
                }
            }
        }

        if let Some(task) = self.in_flight.take() {
            let joined = task.await;
            self.finish(joined);
        }
        debug!(owner = %self.owner_id, "Sync scheduler stopped");
    }

    fn handle(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Changed { local } => {
                self.refresh_pending();
                if local {
                    self.request(self.config.debounce);
                }
            }
            Trigger::Reconnected => {
                debug!(owner = %self.owner_id, "Back online");
                self.request(self.config.reconnect_delay);
            }
            Trigger::WentOffline => {
                debug!(owner = %self.owner_id, "Offline, cancelling scheduled sync");
                self.debounce_at = None;
            }
            Trigger::Foreground => {
                if self.can_sync() {
                    if self.in_flight.is_some() {
                        self.rerun = true;
                    } else {
                        self.start_sync("foreground");
                    }
                }
            }
            Trigger::Enabled(enabled) => {
                if enabled {
                    if lock_status(&self.status).pending_count > 0 {
                        self.request(self.config.debounce);
                    }
                } else {
                    self.debounce_at = None;
                    self.rerun = false;
                }
            }
            Trigger::SyncNow(reply) => {
                if self.can_sync() && self.in_flight.is_none() {
                    self.waiters.push(reply);
                    self.start_sync("manual");
                } else {
                    let _ = reply.send(None);
                }
            }
            Trigger::Shutdown => {}
        }
    }

    fn can_sync(&self) -> bool {
        let status = lock_status(&self.status);
        status.is_enabled && status.is_online
    }

    /// Ask for a sync after `delay`, or after the in-flight one.
    fn request(&mut self, delay: Duration) {
        if !self.can_sync() {
            return;
        }
        if self.in_flight.is_some() {
            self.rerun = true;
        } else {
            self.arm(delay);
        }
    }

    fn arm(&mut self, delay: Duration) {
        self.debounce_at = Some(Instant::now() + delay);
    }

    fn start_sync(&mut self, reason: &'static str) {
        debug!(owner = %self.owner_id, reason, "Starting sync");
        self.debounce_at = None;
        self.rerun = false;
        lock_status(&self.status).is_syncing = true;

        let engine = Arc::clone(&self.engine);
        let owner_id = self.owner_id.clone();
        self.in_flight = Some(tokio::spawn(async move { engine.sync_all(&owner_id).await }));
    }

    fn finish(&mut self, joined: std::result::Result<SyncResult, JoinError>) {
        let result = match joined {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(owner = %self.owner_id, error = %e, "Sync task failed");
                None
            }
        };

        {
            let mut status = lock_status(&self.status);
            status.is_syncing = false;
            status.last_sync_at = Some(chrono::Utc::now().timestamp_millis());
            status.last_error = match &result {
                Some(result) => result.first_error().map(str::to_string),
                None => Some("sync task failed".to_string()),
            };
        }
        self.refresh_pending();

        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(result.clone());
        }

        if std::mem::take(&mut self.rerun) && self.can_sync() {
            self.arm(self.config.debounce);
        }
    }

    fn refresh_pending(&self) {
        let count = lock_store(self.engine.store()).and_then(|s| s.count_pending(&self.owner_id));
        match count {
            Ok(count) => lock_status(&self.status).pending_count = count,
            Err(e) => warn!(owner = %self.owner_id, error = %e, "Could not count pending records"),
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => pending().await,
    }
}

async fn join(
    task: &mut Option<JoinHandle<SyncResult>>,
) -> std::result::Result<SyncResult, JoinError> {
    match task {
        Some(task) => task.await,
        None => pending().await,
    }
}
