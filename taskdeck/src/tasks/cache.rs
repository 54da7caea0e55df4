//! Local task cache for the signed-in owner.
//!
//! Pure state with no I/O. The cache keeps every loaded task sorted by
//! [`Task::display_cmp`], tracks a page cursor per partition and remembers
//! ids that were removed so that a late page cannot bring them back.
//!
//! Every [`reset`](TaskCache::reset) bumps the session epoch. Async work
//! captures the epoch when it starts and must compare it before touching
//! the cache again.

use std::collections::HashSet;

use taskdeck_proto::source::{ChangeKind, Page, PageCursor, TaskChange};
use taskdeck_proto::task::{OrderUpdate, OwnerId, Partition, Task, TaskId};

#[derive(Debug, Clone, Default)]
struct PartitionState {
    cursor: Option<PageCursor>,
    exhausted: bool,
}

/// Sorted, de-duplicated view of one owner's tasks.
#[derive(Debug, Default)]
pub struct TaskCache {
    owner: Option<OwnerId>,
    epoch: u64,
    tasks: Vec<Task>,
    tombstones: HashSet<TaskId>,
    pending: PartitionState,
    completed: PartitionState,
}

impl TaskCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    /// Current session epoch.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Clears everything and starts a new session for `owner`.
    ///
    /// Returns the new epoch.
    pub fn reset(&mut self, owner: Option<OwnerId>) -> u64 {
        self.epoch += 1;
        self.owner = owner;
        self.tasks.clear();
        self.tombstones.clear();
        self.pending = PartitionState::default();
        self.completed = PartitionState::default();
        self.epoch
    }

    const fn state(&self, partition: Partition) -> &PartitionState {
        match partition {
            Partition::Pending => &self.pending,
            Partition::Completed => &self.completed,
        }
    }

    fn state_mut(&mut self, partition: Partition) -> &mut PartitionState {
        match partition {
            Partition::Pending => &mut self.pending,
            Partition::Completed => &mut self.completed,
        }
    }

    /// Cursor for the next page of `partition`.
    #[must_use]
    pub fn cursor(&self, partition: Partition) -> Option<PageCursor> {
        self.state(partition).cursor.clone()
    }

    /// `true` until a page of `partition` came back short. Always `false`
    /// when nobody is signed in.
    #[must_use]
    pub const fn has_more(&self, partition: Partition) -> bool {
        self.owner.is_some() && !self.state(partition).exhausted
    }

    /// Merges a page fetched for `partition` with `requested` rows.
    ///
    /// Rows already cached, tombstoned, owned by someone else or outside
    /// `partition` are skipped. Returns the ids that were actually added.
    pub fn merge_page(&mut self, partition: Partition, page: Page, requested: usize) -> Vec<TaskId> {
        let state = self.state_mut(partition);
        state.exhausted = page.tasks.len() < requested;
        if page.next.is_some() {
            state.cursor = page.next;
        }

        let mut added = Vec::new();
        for task in page.tasks {
            if task.partition() != partition
                || !self.owns(&task)
                || self.tombstones.contains(&task.id)
                || self.contains(&task.id)
            {
                continue;
            }
            added.push(task.id.clone());
            self.tasks.push(task);
        }
        if !added.is_empty() {
            self.resort();
        }
        added
    }

    /// Applies one remote change. Returns `true` if the cache changed.
    ///
    /// `Added` inserts unless the id is already present, `Modified` replaces
    /// an existing entry only, and `Removed` drops the entry and tombstones
    /// the id.
    pub fn apply_delta(&mut self, change: &TaskChange) -> bool {
        if !self.owns(&change.task) {
            return false;
        }
        let id = &change.task.id;
        match change.kind {
            ChangeKind::Added => {
                if self.contains(id) || self.tombstones.contains(id) {
                    return false;
                }
                self.tasks.push(change.task.clone());
                self.resort();
                true
            }
            ChangeKind::Modified => self.replace(change.task.clone()).is_some(),
            ChangeKind::Removed => {
                self.tombstones.insert(id.clone());
                self.take(id).is_some()
            }
        }
    }

    /// Inserts a task created by this client. No-op if it is already cached.
    pub fn insert(&mut self, task: Task) -> bool {
        if !self.owns(&task) || self.contains(&task.id) {
            return false;
        }
        self.tasks.push(task);
        self.resort();
        true
    }

    /// Replaces the cached task with the same id, returning the previous
    /// record. Does nothing if the id is not cached.
    pub fn replace(&mut self, task: Task) -> Option<Task> {
        let slot = self.tasks.iter_mut().find(|t| t.id == task.id)?;
        let previous = std::mem::replace(slot, task);
        self.resort();
        Some(previous)
    }

    /// Removes a task and tombstones its id.
    pub fn remove(&mut self, id: &TaskId) -> Option<Task> {
        let removed = self.take(id)?;
        self.tombstones.insert(id.clone());
        Some(removed)
    }

    /// Puts back a task removed by [`remove`](Self::remove).
    pub fn restore(&mut self, task: Task) -> bool {
        self.tombstones.remove(&task.id);
        self.insert(task)
    }

    /// Applies order values, returning the previous value of every task
    /// that was changed.
    pub fn set_orders(&mut self, updates: &[OrderUpdate]) -> Vec<OrderUpdate> {
        let mut previous = Vec::with_capacity(updates.len());
        for update in updates {
            if let Some(task) = self.tasks.iter_mut().find(|t| t.id == update.id) {
                previous.push(OrderUpdate {
                    id: update.id.clone(),
                    order: task.order,
                });
                task.order = update.order;
            }
        }
        self.resort();
        previous
    }

    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.get(id).is_some()
    }

    /// Members of `partition` in display order.
    pub fn members(&self, partition: Partition) -> impl Iterator<Item = &Task> {
        self.tasks.iter().filter(move |t| t.partition() == partition)
    }

    #[must_use]
    pub fn partition(&self, partition: Partition) -> Vec<Task> {
        self.members(partition).cloned().collect()
    }

    #[must_use]
    pub fn pending(&self) -> Vec<Task> {
        self.partition(Partition::Pending)
    }

    #[must_use]
    pub fn completed(&self) -> Vec<Task> {
        self.partition(Partition::Completed)
    }

    /// Every cached task in display order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn owns(&self, task: &Task) -> bool {
        self.owner.as_ref() == Some(&task.owner)
    }

    fn take(&mut self, id: &TaskId) -> Option<Task> {
        let index = self.tasks.iter().position(|t| &t.id == id)?;
        Some(self.tasks.remove(index))
    }

    fn resort(&mut self) {
        self.tasks.sort_by(Task::display_cmp);
    }
}
