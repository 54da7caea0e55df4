//! Task model shared by the client core and remote backends.
//!
//! A [`Task`] lives in exactly one [`Partition`] (pending or completed),
//! chosen by its `completed` flag. Within a partition tasks are displayed
//! by ascending `order`; ties are broken by `created_at`, then by id, so
//! every view of a partition has one deterministic order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum task text length in characters (after trimming).
pub const MIN_TASK_TEXT_LENGTH: usize = 3;

/// Maximum task text length in characters.
pub const MAX_TASK_TEXT_LENGTH: usize = 500;

/// Distance between a new front-of-partition task and the previous front.
pub const ORDER_STEP: f64 = 1.0;

/// Opaque task identifier assigned by the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps a backend-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the signed-in user that owns a set of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Wraps an auth-provider user identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The pending or completed subset of an owner's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Tasks with `completed == false`.
    Pending,
    /// Tasks with `completed == true`.
    Completed,
}

impl Partition {
    /// Both partitions, pending first.
    pub const ALL: [Self; 2] = [Self::Pending, Self::Completed];

    /// Returns the partition a task with the given completion flag belongs to.
    #[must_use]
    pub const fn of(completed: bool) -> Self {
        if completed {
            Self::Completed
        } else {
            Self::Pending
        }
    }

    /// Returns the completion flag shared by every member of this partition.
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A task record as stored by the remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Backend-assigned identifier.
    pub id: TaskId,
    /// Owner of the task.
    pub owner: OwnerId,
    /// Task text, 3 to 500 characters.
    pub text: String,
    /// Completion flag; selects the partition.
    pub completed: bool,
    /// Position within the partition (ascending).
    pub order: f64,
    /// Backend-assigned creation time.
    pub created_at: DateTime<Utc>,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
}

impl Task {
    /// Returns the partition this task currently belongs to.
    #[must_use]
    pub const fn partition(&self) -> Partition {
        Partition::of(self.completed)
    }

    /// Display ordering: `order`, then `created_at`, then `id`.
    #[must_use]
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.order
            .total_cmp(&other.order)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A task as submitted for creation, before the backend assigns an id
/// and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    /// Owner of the new task.
    pub owner: OwnerId,
    /// Task text.
    pub text: String,
    /// Initial completion flag.
    pub completed: bool,
    /// Initial position.
    pub order: f64,
    /// Optional due date.
    pub due_date: Option<DateTime<Utc>>,
}

/// A partial update to a task. `None` fields are left untouched.
///
/// `due_date` is doubly optional: `Some(None)` clears the due date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New text.
    pub text: Option<String>,
    /// New completion flag.
    pub completed: Option<bool>,
    /// New order.
    pub order: Option<f64>,
    /// New (or cleared) due date.
    pub due_date: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// Patch that sets the text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Patch that sets the completion flag.
    #[must_use]
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    /// Patch that sets or clears the due date.
    #[must_use]
    pub fn due_date(due_date: Option<DateTime<Utc>>) -> Self {
        Self {
            due_date: Some(due_date),
            ..Self::default()
        }
    }

    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.completed.is_none()
            && self.order.is_none()
            && self.due_date.is_none()
    }

    /// Returns a copy of `task` with this patch applied.
    #[must_use]
    pub fn apply_to(&self, task: &Task) -> Task {
        let mut merged = task.clone();
        if let Some(text) = &self.text {
            merged.text.clone_from(text);
        }
        if let Some(completed) = self.completed {
            merged.completed = completed;
        }
        if let Some(order) = self.order {
            merged.order = order;
        }
        if let Some(due_date) = self.due_date {
            merged.due_date = due_date;
        }
        merged
    }
}

/// A single entry of an atomic order batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Task to move.
    pub id: TaskId,
    /// Its new order value.
    pub order: f64,
}

/// Returns the order that places a new member in front of `members`.
///
/// `min(order) - ORDER_STEP`, or `0.0` for an empty partition.
pub fn front_order<'a>(members: impl IntoIterator<Item = &'a Task>) -> f64 {
    members
        .into_iter()
        .map(|t| t.order)
        .reduce(f64::min)
        .map_or(0.0, |min| min - ORDER_STEP)
}
