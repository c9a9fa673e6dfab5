//! Broadcast hub
//!
//! Fans every buffer change out to all registered observers. Each delivery
//! carries the full current snapshot, never a diff.
//!
//! Every observer drains its own queue on a dedicated thread. Publishing only
//! pushes the snapshot onto those queues, so a slow observer delays nobody
//! but itself.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

use super::buffer::Snapshot;
use super::fallback::{FallbackSink, Fault};

/// Callback invoked with every new snapshot
pub type Observer = Arc<dyn Fn(&Snapshot) + Send + Sync>;

/// Handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

thread_local! {
    /// Set while an observer callback runs on this thread
    static IN_OBSERVER: Cell<bool> = const { Cell::new(false) };
}

/// Item on an observer's queue
enum Delivery {
    Snapshot(Snapshot),
    Settle(oneshot::Sender<()>),
}

/// Registry side of one subscription
struct Subscriber {
    id: SubscriptionId,
    tx: mpsc::UnboundedSender<Delivery>,
    active: Arc<AtomicBool>,
}

/// Delivery side of one subscription, owned by its thread
struct Worker {
    id: SubscriptionId,
    observer: Observer,
    active: Arc<AtomicBool>,
    fallback: Arc<dyn FallbackSink>,
}

impl Worker {
    fn run(self, mut rx: mpsc::UnboundedReceiver<Delivery>) {
        IN_OBSERVER.with(|flag| flag.set(true));
        while let Some(delivery) = rx.blocking_recv() {
            match delivery {
                Delivery::Snapshot(snapshot) => {
                    if self.active.load(Ordering::Acquire) {
                        self.deliver(&snapshot);
                    }
                }
                Delivery::Settle(done) => {
                    let _ = done.send(());
                }
            }
        }
        trace!(subscription = %self.id, "Observer thread finished");
    }

    /// Synchronous delivery on the subscribing thread
    fn replay(&self, snapshot: &Snapshot) {
        let outer = IN_OBSERVER.with(|flag| flag.replace(true));
        self.deliver(snapshot);
        IN_OBSERVER.with(|flag| flag.set(outer));
    }

    fn deliver(&self, snapshot: &Snapshot) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| (self.observer)(snapshot)));
        if let Err(payload) = result {
            self.fallback.report(&Fault::Observer {
                subscription: self.id,
                message: panic_message(payload.as_ref()),
            });
        }
    }
}

struct Registry {
    subscribers: Vec<Subscriber>,
    next_id: u64,
    latest: Snapshot,
}

/// Registry of observers plus the most recently published snapshot
pub struct BroadcastHub {
    registry: Mutex<Registry>,
    fallback: Arc<dyn FallbackSink>,
}

impl BroadcastHub {
    /// Create a hub whose current snapshot is `initial`
    pub fn new(initial: Snapshot, fallback: Arc<dyn FallbackSink>) -> Self {
        Self {
            registry: Mutex::new(Registry {
                subscribers: Vec::new(),
                next_id: 1,
                latest: initial,
            }),
            fallback,
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver the current snapshot to `observer` on the calling thread, then
    /// start its delivery thread for later snapshots
    ///
    /// The queue is registered together with reading the current snapshot,
    /// so snapshots published during the replay are delivered right after it.
    pub fn subscribe(&self, observer: Observer) -> SubscriptionId {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(true));

        let (id, current) = {
            let mut registry = self.registry();
            let id = SubscriptionId(registry.next_id);
            registry.next_id += 1;
            registry.subscribers.push(Subscriber {
                id,
                tx,
                active: Arc::clone(&active),
            });
            (id, registry.latest.clone())
        };

        let worker = Worker {
            id,
            observer,
            active,
            fallback: Arc::clone(&self.fallback),
        };
        worker.replay(&current);

        let spawned = thread::Builder::new()
            .name(format!("logbus-observer-{}", id.0))
            .spawn(move || worker.run(rx));
        if let Err(e) = spawned {
            warn!(subscription = %id, error = %e, "Failed to start observer thread");
            self.unsubscribe(id);
        }

        trace!(subscription = %id, "Observer subscribed");
        id
    }

    /// Stop notifying `id`. Returns false if it was not registered.
    ///
    /// Snapshots still queued for `id` are discarded.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry();
        match registry.subscribers.iter().position(|s| s.id == id) {
            Some(pos) => {
                let subscriber = registry.subscribers.remove(pos);
                subscriber.active.store(false, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Record `snapshot` as current and queue it for every observer in
    /// registration order; returns without waiting for any observer
    pub fn publish(&self, snapshot: Snapshot) {
        let mut registry = self.registry();
        registry.latest = snapshot.clone();
        for subscriber in &registry.subscribers {
            let _ = subscriber.tx.send(Delivery::Snapshot(snapshot.clone()));
        }
    }

    /// Snapshot most recently published (or the initial one)
    pub fn latest(&self) -> Snapshot {
        self.registry().latest.clone()
    }

    pub fn observer_count(&self) -> usize {
        self.registry().subscribers.len()
    }

    /// Block until every snapshot published before this call has been
    /// delivered
    ///
    /// Called from inside an observer it returns without waiting, since the
    /// caller's own queue cannot drain meanwhile.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context. Use
    /// [`settle_async`](Self::settle_async) there.
    pub fn settle(&self) {
        for done in self.request_settle() {
            let _ = done.blocking_recv();
        }
    }

    /// Async counterpart of [`settle`](Self::settle)
    pub async fn settle_async(&self) {
        for done in self.request_settle() {
            let _ = done.await;
        }
    }

    fn request_settle(&self) -> Vec<oneshot::Receiver<()>> {
        if IN_OBSERVER.with(Cell::get) {
            return Vec::new();
        }
        self.registry()
            .subscribers
            .iter()
            .filter_map(|subscriber| {
                let (done_tx, done_rx) = oneshot::channel();
                subscriber
                    .tx
                    .send(Delivery::Settle(done_tx))
                    .ok()
                    .map(|()| done_rx)
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
