//! Synchronous observer registry for cache change notifications.
//!
//! Observers are plain callbacks. [`ObserverBus::publish`] snapshots the
//! registry before invoking anything, so a callback may subscribe or
//! unsubscribe (itself included) without deadlocking or skipping peers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use taskdeck_proto::source::{ChangeKind, SourceError};
use taskdeck_proto::task::{OwnerId, Partition, TaskId};

/// Local write that changed the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Reorder,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Reorder => write!(f, "reorder"),
        }
    }
}

/// Notification published after every visible cache change.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// The cache was cleared for a new session.
    Reset { owner: Option<OwnerId> },
    /// A page was merged into `partition`.
    PageLoaded { partition: Partition, added: usize },
    /// A remote change was applied.
    DeltaApplied { kind: ChangeKind, id: TaskId },
    /// A local write changed the cache.
    Mutated {
        mutation: MutationKind,
        id: Option<TaskId>,
    },
    /// A local write was undone after its remote write failed.
    RolledBack { mutation: MutationKind },
    /// The live change stream reported an error.
    StreamError { error: SourceError },
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, Callback<E>)>>,
}

/// Fan-out of events to registered callbacks.
pub struct ObserverBus<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Clone for ObserverBus<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> Default for ObserverBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> ObserverBus<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Registers `callback`; it stays registered until the returned
    /// [`Subscription`] is unsubscribed.
    pub fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> Subscription<E> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.observers.lock().push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invokes every observer registered at the time of the call.
    pub fn publish(&self, event: &E) {
        let observers: Vec<Callback<E>> = self
            .registry
            .observers
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in observers {
            callback(event);
        }
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.registry.observers.lock().len()
    }
}

/// Handle returned by [`ObserverBus::subscribe`].
pub struct Subscription<E> {
    id: u64,
    registry: Weak<Registry<E>>,
}

impl<E> Subscription<E> {
    /// Removes the observer. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut observers = registry.observers.lock();
        let before = observers.len();
        observers.retain(|(id, _)| *id != self.id);
        observers.len() != before
    }
}
