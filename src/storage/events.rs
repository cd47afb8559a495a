//! Change notifications for the record store.
//!
//! A [`ChangeBus`] is an explicit, constructed registry of listener
//! callbacks. The store owns one and fires it after every committed write;
//! observers (the sync scheduler, UI glue) subscribe to learn that
//! *something* changed and re-query their own scope.
//!
//! Dispatch snapshots the listener set and releases the lock before calling
//! anyone, so a listener may subscribe or unsubscribe from inside its own
//! callback. A listener removed mid-dispatch is skipped for the rest of that
//! dispatch.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::trace;

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    /// Soft delete (tombstone written)
    Deleted,
    /// Row physically removed
    Purged,
    /// Sync bookkeeping changed (synced / conflict)
    SyncState,
    /// Row written from a remote pull
    Pulled,
}

impl ChangeKind {
    /// Get the string representation for logging.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Purged => "purged",
            Self::SyncState => "sync_state",
            Self::Pulled => "pulled",
        }
    }
}

/// Who caused the change.
///
/// Only `Local` changes create new work for the sync engine; `Sync` changes
/// are the engine's own bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Local,
    Sync,
}

/// A committed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub record_id: String,
    pub owner_id: String,
    pub change: ChangeKind,
    pub origin: ChangeOrigin,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(record_id: &str, owner_id: &str, change: ChangeKind, origin: ChangeOrigin) -> Self {
        Self {
            record_id: record_id.to_string(),
            owner_id: owner_id.to_string(),
            change,
            origin,
        }
    }
}

type Callback = dyn Fn(&ChangeEvent) + Send + Sync;

struct Listener {
    id: u64,
    active: AtomicBool,
    callback: Box<Callback>,
}

#[derive(Default)]
struct Registry {
    listeners: Vec<Arc<Listener>>,
    closed: bool,
}

struct BusInner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

impl BusInner {
    // A panicking listener must not take the whole bus down with it.
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Process-wide change notification hub (cheap to clone).
#[derive(Clone)]
pub struct ChangeBus {
    inner: Arc<BusInner>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ChangeBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register a listener. It stays registered until
    /// [`Subscription::unsubscribe`] or [`ChangeBus::close`].
    ///
    /// Subscribing to a closed bus returns an inert subscription.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let listener = Arc::new(Listener {
            id,
            active: AtomicBool::new(true),
            callback: Box::new(callback),
        });

        let mut registry = self.inner.registry();
        if registry.closed {
            listener.active.store(false, Ordering::Release);
        } else {
            registry.listeners.push(Arc::clone(&listener));
        }
        drop(registry);

        Subscription {
            bus: Arc::downgrade(&self.inner),
            listener,
        }
    }

    /// Deliver `event` to every active listener exactly once.
    pub fn notify(&self, event: &ChangeEvent) {
        let snapshot: Vec<Arc<Listener>> = {
            let registry = self.inner.registry();
            if registry.closed {
                return;
            }
            registry.listeners.clone()
        };

        trace!(
            record = %event.record_id,
            change = event.change.as_str(),
            listeners = snapshot.len(),
            "Dispatching change"
        );

        for listener in snapshot {
            if listener.active.load(Ordering::Acquire) {
                (listener.callback)(event);
            }
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.registry().listeners.len()
    }

    /// Drop every listener. Later notifications are no-ops.
    pub fn close(&self) {
        let drained = {
            let mut registry = self.inner.registry();
            registry.closed = true;
            std::mem::take(&mut registry.listeners)
        };
        for listener in drained {
            listener.active.store(false, Ordering::Release);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.registry().closed
    }
}

/// Handle returned by [`ChangeBus::subscribe`].
///
/// Dropping the handle does not unsubscribe; call
/// [`Subscription::unsubscribe`] explicitly.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    bus: Weak<BusInner>,
    listener: Arc<Listener>,
}

impl Subscription {
    /// Remove the listener. Idempotent, and safe to call from inside a
    /// listener callback.
    pub fn unsubscribe(&self) {
        if !self.listener.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            let id = self.listener.id;
            bus.registry().listeners.retain(|l| l.id != id);
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.listener.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.listener.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::OnceLock;

    fn event() -> ChangeEvent {
        ChangeEvent::new("rec_1", "u1", ChangeKind::Created, ChangeOrigin::Local)
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn test_every_listener_called_once() {
        let bus = ChangeBus::new();
        let a = counter();
        let b = counter();
        let (a2, b2) = (Arc::clone(&a), Arc::clone(&b));
        let _sa = bus.subscribe(move |_| {
            a2.fetch_add(1, Ordering::SeqCst);
        });
        let _sb = bus.subscribe(move |_| {
            b2.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(&event());

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = ChangeBus::new();
        let hits = counter();
        let h = Arc::clone(&hits);
        let sub = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(&event());
        sub.unsubscribe();
        sub.unsubscribe();
        bus.notify(&event());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_unsubscribe_inside_callback() {
        let bus = ChangeBus::new();
        let first_hits = counter();
        let second_hits = counter();

        // The first listener removes itself while being notified.
        let own: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        let own_in_cb = Arc::clone(&own);
        let f = Arc::clone(&first_hits);
        let sub = bus.subscribe(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
            if let Some(s) = own_in_cb.get() {
                s.unsubscribe();
            }
        });
        let _ = own.set(sub);

        let s = Arc::clone(&second_hits);
        let _other = bus.subscribe(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        bus.notify(&event());
        bus.notify(&event());

        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_removed_mid_dispatch_is_skipped() {
        let bus = ChangeBus::new();
        let victim_hits = counter();

        let victim_slot: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        let slot = Arc::clone(&victim_slot);
        let _killer = bus.subscribe(move |_| {
            if let Some(victim) = slot.get() {
                victim.unsubscribe();
            }
        });

        let v = Arc::clone(&victim_hits);
        let victim = bus.subscribe(move |_| {
            v.fetch_add(1, Ordering::SeqCst);
        });
        let _ = victim_slot.set(victim);

        bus.notify(&event());
        assert_eq!(victim_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_close_drops_listeners() {
        let bus = ChangeBus::new();
        let hits = counter();
        let h = Arc::clone(&hits);
        let sub = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.close();
        bus.notify(&event());
        assert!(!sub.is_active());
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let late = bus.subscribe(|_| {});
        assert!(!late.is_active());
        assert!(bus.is_closed());
    }

    #[test]
    fn test_buses_are_isolated() {
        let a = ChangeBus::new();
        let b = ChangeBus::new();
        let hits = counter();
        let h = Arc::clone(&hits);
        let _sub = a.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        b.notify(&event());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
