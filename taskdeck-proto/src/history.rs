//! History log model: an append-only record of user actions on tasks.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::OwnerId;
use crate::validation::ValidationError;

/// Maximum history text length in characters.
pub const MAX_HISTORY_TEXT_LENGTH: usize = 500;

/// The closed set of actions that can be recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryAction {
    /// A task was created.
    Created,
    /// A task was marked complete.
    Completed,
    /// A task's text was edited.
    Edited,
    /// A task was deleted.
    Deleted,
    /// A completed task was moved back to pending.
    MarkedIncomplete,
    /// All pending tasks were removed at once.
    ClearedPending,
}

impl HistoryAction {
    /// Every action, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Completed,
        Self::Edited,
        Self::Deleted,
        Self::MarkedIncomplete,
        Self::ClearedPending,
    ];

    /// Human-readable label as stored in the history collection.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "Task created",
            Self::Completed => "Task completed",
            Self::Edited => "Task edited",
            Self::Deleted => "Task deleted",
            Self::MarkedIncomplete => "Task marked incomplete",
            Self::ClearedPending => "Pending tasks cleared",
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for HistoryAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.label() == s)
            .ok_or_else(|| ValidationError::UnknownAction(s.to_string()))
    }
}

/// A recorded history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Backend-assigned identifier.
    pub id: String,
    /// Owner the entry belongs to.
    pub owner: OwnerId,
    /// What happened.
    pub action: HistoryAction,
    /// Snapshot of the task text at the time of the action.
    pub task_text: String,
    /// Server-assigned time of the action.
    pub timestamp: DateTime<Utc>,
}

/// A history entry as submitted for appending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    /// Owner the entry belongs to.
    pub owner: OwnerId,
    /// What happened.
    pub action: HistoryAction,
    /// Snapshot of the task text.
    pub task_text: String,
}
