//! In-memory task and history backend.
//!
//! [`MemoryBackend`] keeps every owner's tasks and history in process and
//! implements [`TaskSource`] and [`HistorySource`]. Every write fans out a
//! [`TaskChange`] to the owner's live subscriptions, in write order.
//!
//! For tests it can also:
//! - fail the next call of a given [`Operation`] ([`fail_next`](MemoryBackend::fail_next))
//! - hold page fetches until released ([`hold_fetches`](MemoryBackend::hold_fetches))
//! - push an error into an owner's change streams
//!   ([`emit_stream_error`](MemoryBackend::emit_stream_error))

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use taskdeck_proto::history::{HistoryEntry, NewHistoryEntry};
use taskdeck_proto::source::{
    ChangeKind, ChangeStream, HistorySource, Page, PageCursor, PageRequest, SourceError,
    TaskChange, TaskSource,
};
use taskdeck_proto::task::{NewTask, OrderUpdate, OwnerId, Partition, Task, TaskId, TaskPatch};

/// Backend calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`TaskSource::fetch_page`].
    Fetch,
    /// [`TaskSource::subscribe`].
    Subscribe,
    /// [`TaskSource::insert`].
    Insert,
    /// [`TaskSource::update`].
    Update,
    /// [`TaskSource::update_orders`].
    UpdateOrders,
    /// [`TaskSource::delete`].
    Delete,
    /// [`TaskSource::count`].
    Count,
    /// [`HistorySource::append`].
    Append,
    /// [`HistorySource::delete_batch`].
    DeleteHistory,
    /// [`HistorySource::recent`].
    Recent,
}

type ChangeSender = mpsc::UnboundedSender<Result<TaskChange, SourceError>>;

#[derive(Default)]
struct BackendState {
    tasks: HashMap<TaskId, Task>,
    history: Vec<HistoryEntry>,
    subscribers: HashMap<OwnerId, Vec<ChangeSender>>,
}

impl BackendState {
    /// Sends `change` to every live subscriber of `owner`, pruning closed ones.
    fn publish(&mut self, owner: &OwnerId, change: &TaskChange) {
        if let Some(senders) = self.subscribers.get_mut(owner) {
            senders.retain(|tx| tx.send(Ok(change.clone())).is_ok());
        }
    }
}

/// In-memory implementation of the remote task and history sources.
pub struct MemoryBackend {
    state: Mutex<BackendState>,
    faults: Mutex<HashMap<Operation, VecDeque<SourceError>>>,
    fetch_gate: watch::Sender<bool>,
    fetches: AtomicUsize,
    writes: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Creates an empty backend with fetches flowing freely.
    #[must_use]
    pub fn new() -> Self {
        let (fetch_gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(BackendState::default()),
            faults: Mutex::new(HashMap::new()),
            fetch_gate,
            fetches: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Makes the next call of `op` fail with `error`. Calls queue up.
    pub fn fail_next(&self, op: Operation, error: SourceError) {
        self.faults.lock().entry(op).or_default().push_back(error);
    }

    /// Blocks page fetches until [`release_fetches`](Self::release_fetches).
    pub fn hold_fetches(&self) {
        self.fetch_gate.send_replace(false);
    }

    /// Lets held and future page fetches proceed.
    pub fn release_fetches(&self) {
        self.fetch_gate.send_replace(true);
    }

    /// Number of page fetches that reached the backend.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of successful task writes (insert, update, batch, delete).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Inserts a fully specified task, bypassing id and time assignment,
    /// and notifies subscribers.
    pub fn seed_task(&self, task: Task) {
        let mut state = self.state.lock();
        let owner = task.owner.clone();
        state.tasks.insert(task.id.clone(), task.clone());
        state.publish(
            &owner,
            &TaskChange {
                kind: ChangeKind::Added,
                task,
            },
        );
    }

    /// Inserts a history entry with an explicit timestamp.
    pub fn seed_history(&self, entry: NewHistoryEntry, timestamp: DateTime<Utc>) -> HistoryEntry {
        let entry = HistoryEntry {
            id: Uuid::now_v7().to_string(),
            owner: entry.owner,
            action: entry.action,
            task_text: entry.task_text,
            timestamp,
        };
        self.state.lock().history.push(entry.clone());
        entry
    }

    /// Pushes `error` into every open change stream of `owner`.
    pub fn emit_stream_error(&self, owner: &OwnerId, error: SourceError) {
        let mut state = self.state.lock();
        if let Some(senders) = state.subscribers.get_mut(owner) {
            senders.retain(|tx| tx.send(Err(error.clone())).is_ok());
        }
    }

    /// All tasks of `owner` in a partition, sorted for display.
    pub fn tasks_of(&self, owner: &OwnerId, partition: Partition) -> Vec<Task> {
        let state = self.state.lock();
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.owner == *owner && t.partition() == partition)
            .cloned()
            .collect();
        drop(state);
        tasks.sort_by(Task::display_cmp);
        tasks
    }

    /// Looks up one task by id.
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.get(id).cloned()
    }

    /// Number of history entries stored for `owner`.
    pub fn history_len(&self, owner: &OwnerId) -> usize {
        self.state
            .lock()
            .history
            .iter()
            .filter(|e| e.owner == *owner)
            .count()
    }

    /// Number of live change streams for `owner`.
    pub fn subscriber_count(&self, owner: &OwnerId) -> usize {
        let mut state = self.state.lock();
        state.subscribers.get_mut(owner).map_or(0, |senders| {
            senders.retain(|tx| !tx.is_closed());
            senders.len()
        })
    }

    /// Pops a queued failure for `op`, if any.
    fn take_fault(&self, op: Operation) -> Result<(), SourceError> {
        let fault = self.faults.lock().get_mut(&op).and_then(VecDeque::pop_front);
        match fault {
            Some(err) => {
                tracing::debug!(?op, error = %err, "injected backend failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl TaskSource for MemoryBackend {
    async fn fetch_page(&self, request: PageRequest) -> Result<Page, SourceError> {
        let mut gate = self.fetch_gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(SourceError::Unavailable("backend shut down".to_string()));
        }
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.take_fault(Operation::Fetch)?;

        let mut rows: Vec<Task> = {
            let state = self.state.lock();
            state
                .tasks
                .values()
                .filter(|t| t.owner == request.owner && t.partition() == request.partition)
                .filter(|t| request.after.as_ref().is_none_or(|c| c.admits(t)))
                .cloned()
                .collect()
        };
        rows.sort_by(Task::display_cmp);
        rows.truncate(request.limit);

        let next = rows.last().map(PageCursor::after);
        Ok(Page { tasks: rows, next })
    }

    fn subscribe(&self, owner: &OwnerId) -> Result<ChangeStream, SourceError> {
        self.take_fault(Operation::Subscribe)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .subscribers
            .entry(owner.clone())
            .or_default()
            .push(tx);
        tracing::debug!(%owner, "change subscription opened");
        Ok(rx)
    }

    async fn insert(&self, task: NewTask) -> Result<Task, SourceError> {
        self.take_fault(Operation::Insert)?;
        let task = Task {
            id: TaskId::new(Uuid::now_v7().to_string()),
            owner: task.owner,
            text: task.text,
            completed: task.completed,
            order: task.order,
            created_at: Utc::now(),
            due_date: task.due_date,
        };

        let mut state = self.state.lock();
        state.tasks.insert(task.id.clone(), task.clone());
        state.publish(
            &task.owner,
            &TaskChange {
                kind: ChangeKind::Added,
                task: task.clone(),
            },
        );
        drop(state);

        self.record_write();
        tracing::debug!(task_id = %task.id, owner = %task.owner, "task inserted");
        Ok(task)
    }

    async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<(), SourceError> {
        self.take_fault(Operation::Update)?;
        let mut state = self.state.lock();
        let Some(existing) = state.tasks.get(id) else {
            return Err(SourceError::NotFound(id.to_string()));
        };
        let updated = patch.apply_to(existing);
        state.tasks.insert(id.clone(), updated.clone());
        let owner = updated.owner.clone();
        state.publish(
            &owner,
            &TaskChange {
                kind: ChangeKind::Modified,
                task: updated,
            },
        );
        drop(state);

        self.record_write();
        Ok(())
    }

    async fn update_orders(&self, updates: Vec<OrderUpdate>) -> Result<(), SourceError> {
        self.take_fault(Operation::UpdateOrders)?;
        let mut state = self.state.lock();
        if let Some(missing) = updates.iter().find(|u| !state.tasks.contains_key(&u.id)) {
            return Err(SourceError::NotFound(missing.id.to_string()));
        }

        let mut changes = Vec::with_capacity(updates.len());
        for update in &updates {
            if let Some(task) = state.tasks.get_mut(&update.id) {
                task.order = update.order;
                changes.push(task.clone());
            }
        }
        for task in changes {
            let owner = task.owner.clone();
            state.publish(
                &owner,
                &TaskChange {
                    kind: ChangeKind::Modified,
                    task,
                },
            );
        }
        drop(state);

        self.record_write();
        tracing::debug!(count = updates.len(), "order batch committed");
        Ok(())
    }

    async fn delete(&self, id: &TaskId) -> Result<(), SourceError> {
        self.take_fault(Operation::Delete)?;
        let mut state = self.state.lock();
        let Some(task) = state.tasks.remove(id) else {
            return Err(SourceError::NotFound(id.to_string()));
        };
        let owner = task.owner.clone();
        state.publish(
            &owner,
            &TaskChange {
                kind: ChangeKind::Removed,
                task,
            },
        );
        drop(state);

        self.record_write();
        Ok(())
    }

    async fn count(&self, owner: &OwnerId, partition: Partition) -> Result<usize, SourceError> {
        self.take_fault(Operation::Count)?;
        Ok(self
            .state
            .lock()
            .tasks
            .values()
            .filter(|t| t.owner == *owner && t.partition() == partition)
            .count())
    }
}

impl HistorySource for MemoryBackend {
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry, SourceError> {
        self.take_fault(Operation::Append)?;
        Ok(self.seed_history(entry, Utc::now()))
    }

    async fn delete_batch(
        &self,
        owner: &OwnerId,
        cutoff: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<usize, SourceError> {
        self.take_fault(Operation::DeleteHistory)?;
        let mut state = self.state.lock();
        let mut deleted = 0;
        state.history.retain(|entry| {
            let matches = entry.owner == *owner && cutoff.is_none_or(|c| entry.timestamp <= c);
            if matches && deleted < limit {
                deleted += 1;
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }

    async fn recent(&self, owner: &OwnerId, limit: usize) -> Result<Vec<HistoryEntry>, SourceError> {
        self.take_fault(Operation::Recent)?;
        let mut entries: Vec<HistoryEntry> = self
            .state
            .lock()
            .history
            .iter()
            .rev()
            .filter(|e| e.owner == *owner)
            .cloned()
            .collect();
        // Stable sort: entries with equal timestamps stay newest first.
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }
}
