//! Contracts for the remote backend consumed by the client core.
//!
//! The client never talks to a concrete database. It depends on three
//! capabilities:
//! - [`TaskSource`]: paginated queries, change subscription, writes
//! - [`HistorySource`]: append, batched range delete, recent list
//! - [`AuthProvider`]: current owner and owner-change notifications
//!
//! An in-memory implementation lives in the `taskdeck-store` crate.

use std::cmp::Ordering;
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};

use crate::history::{HistoryEntry, NewHistoryEntry};
use crate::task::{NewTask, OrderUpdate, OwnerId, Partition, Task, TaskId, TaskPatch};

/// Errors reported by a remote source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The backend could not be reached or timed out.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the operation for this owner.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The referenced document does not exist remotely.
    #[error("document not found: {0}")]
    NotFound(String),
    /// The backend rejected the write (rule or constraint violation).
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Opaque marker for where the next page of a partition starts.
///
/// Built from the last task of a page; the next page contains only tasks
/// that sort strictly after it.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor {
    order: f64,
    created_at: DateTime<Utc>,
    id: TaskId,
}

impl PageCursor {
    /// Cursor positioned just after `task`.
    #[must_use]
    pub fn after(task: &Task) -> Self {
        Self {
            order: task.order,
            created_at: task.created_at,
            id: task.id.clone(),
        }
    }

    /// Returns `true` if `task` sorts strictly after this cursor.
    #[must_use]
    pub fn admits(&self, task: &Task) -> bool {
        task.order
            .total_cmp(&self.order)
            .then_with(|| task.created_at.cmp(&self.created_at))
            .then_with(|| task.id.cmp(&self.id))
            == Ordering::Greater
    }
}

/// A paginated query for one partition of one owner's tasks.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// Whose tasks.
    pub owner: OwnerId,
    /// Which partition.
    pub partition: Partition,
    /// Resume after this cursor (`None` for the first page).
    pub after: Option<PageCursor>,
    /// Maximum number of rows.
    pub limit: usize,
}

/// One page of query results, sorted for display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Rows of this page.
    pub tasks: Vec<Task>,
    /// Cursor after the last row, if any rows were returned.
    pub next: Option<PageCursor>,
}

/// Kind of an incremental change pushed by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A task appeared.
    Added,
    /// An existing task changed.
    Modified,
    /// A task was deleted.
    Removed,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// A single delta from a subscription.
///
/// For [`ChangeKind::Removed`] `task` is the last known state of the
/// deleted document.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskChange {
    /// What happened.
    pub kind: ChangeKind,
    /// The affected task.
    pub task: Task,
}

/// Stream of deltas for one owner.
///
/// Errors are delivered in-band and do not end the stream; the stream ends
/// when the backend drops its sender.
pub type ChangeStream = mpsc::UnboundedReceiver<Result<TaskChange, SourceError>>;

/// Remote task collection.
pub trait TaskSource: Send + Sync {
    /// Fetch one page of a partition, sorted by `order`, then creation time.
    fn fetch_page(
        &self,
        request: PageRequest,
    ) -> impl Future<Output = Result<Page, SourceError>> + Send;

    /// Subscribe to deltas for `owner`. Dropping the stream cancels it.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the subscription cannot be established.
    fn subscribe(&self, owner: &OwnerId) -> Result<ChangeStream, SourceError>;

    /// Create a task; the backend assigns its id and creation time.
    fn insert(&self, task: NewTask) -> impl Future<Output = Result<Task, SourceError>> + Send;

    /// Apply a partial update to one task.
    fn update(
        &self,
        id: &TaskId,
        patch: TaskPatch,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Atomically apply a batch of order changes. Either all or none apply.
    fn update_orders(
        &self,
        updates: Vec<OrderUpdate>,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Delete one task.
    fn delete(&self, id: &TaskId) -> impl Future<Output = Result<(), SourceError>> + Send;

    /// Number of tasks `owner` has in `partition`.
    fn count(
        &self,
        owner: &OwnerId,
        partition: Partition,
    ) -> impl Future<Output = Result<usize, SourceError>> + Send;
}

/// Remote history collection.
pub trait HistorySource: Send + Sync {
    /// Append an entry; the backend assigns its id and timestamp.
    fn append(
        &self,
        entry: NewHistoryEntry,
    ) -> impl Future<Output = Result<HistoryEntry, SourceError>> + Send;

    /// Delete up to `limit` of `owner`'s entries stamped at or before
    /// `cutoff` (every entry when `cutoff` is `None`). Returns how many
    /// were deleted.
    fn delete_batch(
        &self,
        owner: &OwnerId,
        cutoff: Option<DateTime<Utc>>,
        limit: usize,
    ) -> impl Future<Output = Result<usize, SourceError>> + Send;

    /// Up to `limit` most recent entries of `owner`, newest first.
    fn recent(
        &self,
        owner: &OwnerId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, SourceError>> + Send;
}

/// Source of the signed-in owner.
pub trait AuthProvider: Send + Sync {
    /// The currently signed-in owner, if any.
    fn current_owner(&self) -> Option<OwnerId>;

    /// Watch channel that changes whenever the owner signs in or out.
    fn watch_owner(&self) -> watch::Receiver<Option<OwnerId>>;
}
