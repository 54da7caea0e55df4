//! Keeps the local [`TaskCache`] in step with a remote [`TaskSource`].
//!
//! [`TaskSync`] is created once per process and shared behind an `Arc`.
//! It owns the cache, the live change subscription for the current owner
//! and the set of in-flight page loads.
//!
//! # Sessions
//!
//! [`switch_owner`](TaskSync::switch_owner) ends the current session: the
//! subscription task is aborted, in-flight loads are forgotten and the cache
//! is reset under a new epoch. Work started under an older epoch is dropped
//! when it completes.
//!
//! # Page loads
//!
//! Concurrent [`load_page`](TaskSync::load_page) calls for the same
//! partition share one remote fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use taskdeck_proto::source::{ChangeStream, PageRequest, TaskChange, TaskSource};
use taskdeck_proto::task::{OwnerId, Partition, Task, TaskId};

use super::TaskError;
use super::cache::TaskCache;
use super::optimistic::{Optimistic, Rollback};
use crate::bus::{CacheEvent, MutationKind, ObserverBus, Subscription};

/// Default number of rows requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Result of one [`TaskSync::load_page`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOutcome {
    /// Ids newly added to the cache by this page.
    pub added: Vec<TaskId>,
    /// Whether the partition may have more rows.
    pub has_more: bool,
}

type SharedLoad = Shared<BoxFuture<'static, Result<LoadOutcome, TaskError>>>;

#[derive(Clone)]
struct InflightLoad {
    id: u64,
    future: SharedLoad,
}

/// Cache, subscription and pagination for the signed-in owner.
pub struct TaskSync<S: TaskSource> {
    source: Arc<S>,
    page_size: usize,
    cache: Mutex<TaskCache>,
    bus: ObserverBus<CacheEvent>,
    loads: Mutex<HashMap<Partition, InflightLoad>>,
    next_load_id: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<S: TaskSource> Drop for TaskSync<S> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

impl<S: TaskSource + 'static> TaskSync<S> {
    /// Creates a signed-out instance.
    #[must_use]
    pub fn new(source: Arc<S>, page_size: usize) -> Arc<Self> {
        Arc::new(Self {
            source,
            page_size: page_size.max(1),
            cache: Mutex::new(TaskCache::new()),
            bus: ObserverBus::new(),
            loads: Mutex::new(HashMap::new()),
            next_load_id: AtomicU64::new(0),
            listener: Mutex::new(None),
        })
    }

    #[must_use]
    pub const fn source(&self) -> &Arc<S> {
        &self.source
    }

    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Starts a new session for `owner` (or signs out for `None`).
    ///
    /// Must be called from within a Tokio runtime when `owner` is `Some`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if the change subscription cannot be
    /// opened. The cache is still reset for the new owner.
    pub fn switch_owner(self: &Arc<Self>, owner: Option<OwnerId>) -> Result<(), TaskError> {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        self.loads.lock().clear();
        let epoch = self.cache.lock().reset(owner.clone());

        match &owner {
            Some(owner) => tracing::info!(%owner, epoch, "task session started"),
            None => tracing::info!(epoch, "task session ended"),
        }
        self.bus.publish(&CacheEvent::Reset {
            owner: owner.clone(),
        });

        let Some(owner) = owner else {
            return Ok(());
        };
        let stream = self.source.subscribe(&owner).map_err(|err| {
            tracing::warn!(%owner, error = %err, "failed to open task subscription");
            TaskError::from(err)
        })?;
        let listener = tokio::spawn(listen(Arc::downgrade(self), epoch, stream));
        *self.listener.lock() = Some(listener);
        Ok(())
    }

    /// Loads the next page of `partition` into the cache.
    ///
    /// Joins a load already in flight for the same partition. Returns an
    /// empty outcome when signed out, when the partition is exhausted, or
    /// when the owner changed before the page arrived.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if the fetch fails.
    pub async fn load_page(self: &Arc<Self>, partition: Partition) -> Result<LoadOutcome, TaskError> {
        let future = {
            let mut loads = self.loads.lock();
            if let Some(inflight) = loads.get(&partition) {
                tracing::trace!(%partition, "joining in-flight page load");
                inflight.future.clone()
            } else {
                let (request, epoch) = {
                    let cache = self.cache.lock();
                    let Some(owner) = cache.owner().cloned() else {
                        return Ok(LoadOutcome::default());
                    };
                    if !cache.has_more(partition) {
                        return Ok(LoadOutcome {
                            added: Vec::new(),
                            has_more: false,
                        });
                    }
                    let request = PageRequest {
                        owner,
                        partition,
                        after: cache.cursor(partition),
                        limit: self.page_size,
                    };
                    (request, cache.epoch())
                };
                let id = self.next_load_id.fetch_add(1, Ordering::Relaxed);
                let this = Arc::clone(self);
                let future = async move { this.fetch_and_merge(id, epoch, request).await }
                    .boxed()
                    .shared();
                loads.insert(
                    partition,
                    InflightLoad {
                        id,
                        future: future.clone(),
                    },
                );
                future
            }
        };
        future.await
    }

    async fn fetch_and_merge(
        &self,
        id: u64,
        epoch: u64,
        request: PageRequest,
    ) -> Result<LoadOutcome, TaskError> {
        let partition = request.partition;
        let requested = request.limit;
        let result = self.source.fetch_page(request).await;

        {
            let mut loads = self.loads.lock();
            if loads.get(&partition).is_some_and(|l| l.id == id) {
                loads.remove(&partition);
            }
        }

        let outcome = {
            let mut cache = self.cache.lock();
            if cache.epoch() != epoch {
                tracing::debug!(%partition, epoch, "discarding page from a previous session");
                return Ok(LoadOutcome::default());
            }
            let page = result.map_err(|err| {
                tracing::warn!(%partition, error = %err, "page load failed");
                TaskError::from(err)
            })?;
            let added = cache.merge_page(partition, page, requested);
            LoadOutcome {
                added,
                has_more: cache.has_more(partition),
            }
        };

        tracing::debug!(
            %partition,
            added = outcome.added.len(),
            has_more = outcome.has_more,
            "page loaded"
        );
        self.bus.publish(&CacheEvent::PageLoaded {
            partition,
            added: outcome.added.len(),
        });
        Ok(outcome)
    }

    /// Loads pages of `partition` until it is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the first page load failure.
    pub async fn load_all(self: &Arc<Self>, partition: Partition) -> Result<(), TaskError> {
        while self.has_more(partition) {
            let epoch = self.epoch();
            self.load_page(partition).await?;
            if self.epoch() != epoch {
                break;
            }
        }
        Ok(())
    }
}

impl<S: TaskSource> TaskSync<S> {
    /// Applies a remote change to the cache and notifies observers if it
    /// changed anything.
    pub fn apply_remote_delta(&self, change: &TaskChange) -> bool {
        let epoch = self.epoch();
        self.apply_delta_in(epoch, change)
    }

    fn apply_delta_in(&self, epoch: u64, change: &TaskChange) -> bool {
        let changed = {
            let mut cache = self.cache.lock();
            cache.epoch() == epoch && cache.apply_delta(change)
        };
        if changed {
            tracing::trace!(kind = %change.kind, id = %change.task.id, "remote change applied");
            self.bus.publish(&CacheEvent::DeltaApplied {
                kind: change.kind,
                id: change.task.id.clone(),
            });
        }
        changed
    }

    /// Registers an observer for cache changes.
    pub fn subscribe(
        &self,
        callback: impl Fn(&CacheEvent) + Send + Sync + 'static,
    ) -> Subscription<CacheEvent> {
        self.bus.subscribe(callback)
    }

    #[must_use]
    pub fn owner(&self) -> Option<OwnerId> {
        self.cache.lock().owner().cloned()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.cache.lock().epoch()
    }

    /// Pending tasks in display order.
    #[must_use]
    pub fn pending(&self) -> Vec<Task> {
        self.cache.lock().pending()
    }

    /// Completed tasks in display order.
    #[must_use]
    pub fn completed(&self) -> Vec<Task> {
        self.cache.lock().completed()
    }

    #[must_use]
    pub fn partition(&self, partition: Partition) -> Vec<Task> {
        self.cache.lock().partition(partition)
    }

    /// Every loaded task in display order.
    #[must_use]
    pub fn all(&self) -> Vec<Task> {
        self.cache.lock().tasks().to_vec()
    }

    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.cache.lock().get(id).cloned()
    }

    #[must_use]
    pub fn has_more(&self, partition: Partition) -> bool {
        self.cache.lock().has_more(partition)
    }

    /// Runs `f` against the cache under its lock.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&TaskCache) -> R) -> R {
        f(&self.cache.lock())
    }

    /// Inserts a task the remote store has already accepted.
    pub(crate) fn insert_confirmed(&self, epoch: u64, task: Task) -> bool {
        let inserted = {
            let mut cache = self.cache.lock();
            cache.epoch() == epoch && cache.insert(task.clone())
        };
        if inserted {
            self.bus.publish(&CacheEvent::Mutated {
                mutation: MutationKind::Create,
                id: Some(task.id),
            });
        }
        inserted
    }

    /// Applies a local effect ahead of its remote write.
    ///
    /// `apply` returns the state to restore on failure, or `None` if it
    /// changed nothing.
    pub(crate) fn apply_optimistic(
        &self,
        mutation: MutationKind,
        id: Option<TaskId>,
        apply: impl FnOnce(&mut TaskCache) -> Option<Rollback>,
    ) -> Option<Optimistic> {
        let optimistic = {
            let mut cache = self.cache.lock();
            let rollback = apply(&mut cache)?;
            Optimistic {
                epoch: cache.epoch(),
                mutation,
                rollback,
            }
        };
        self.bus.publish(&CacheEvent::Mutated { mutation, id });
        Some(optimistic)
    }

    /// Restores the state captured by `optimistic` if its session is
    /// still current.
    pub(crate) fn roll_back(&self, optimistic: Optimistic) {
        let Optimistic {
            epoch,
            mutation,
            rollback,
        } = optimistic;
        let applied = {
            let mut cache = self.cache.lock();
            if cache.epoch() == epoch {
                rollback.apply(&mut cache);
                true
            } else {
                false
            }
        };
        if applied {
            self.bus.publish(&CacheEvent::RolledBack { mutation });
        }
    }
}

async fn listen<S: TaskSource>(sync: Weak<TaskSync<S>>, epoch: u64, mut stream: ChangeStream) {
    while let Some(item) = stream.recv().await {
        let Some(sync) = sync.upgrade() else {
            break;
        };
        match item {
            Ok(change) => {
                sync.apply_delta_in(epoch, &change);
            }
            Err(error) => {
                tracing::warn!(%error, "task subscription reported an error");
                sync.bus.publish(&CacheEvent::StreamError { error });
            }
        }
    }
    tracing::debug!(epoch, "task subscription closed");
}
