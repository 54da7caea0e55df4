//! Field validation for tasks and history entries.
//!
//! Validation is pure: callers pass the current time so that due-date
//! bounds are testable.

use chrono::{DateTime, Days, Months, NaiveTime, Utc};

use crate::history::MAX_HISTORY_TEXT_LENGTH;
use crate::task::{MAX_TASK_TEXT_LENGTH, MIN_TASK_TEXT_LENGTH, Partition, Task};

/// A task or history field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task text is shorter than the minimum.
    #[error("task text too short (minimum {min} characters)")]
    TextTooShort {
        /// Minimum length in characters.
        min: usize,
    },
    /// Task text is longer than the maximum.
    #[error("task text too long (maximum {max} characters)")]
    TextTooLong {
        /// Maximum length in characters.
        max: usize,
    },
    /// Order is NaN or infinite.
    #[error("task order must be a finite number")]
    InvalidOrder,
    /// Due date falls before today.
    #[error("due date cannot be in the past")]
    DueDateInPast,
    /// Due date is more than one year ahead.
    #[error("due date cannot be more than 1 year in the future")]
    DueDateTooFar,
    /// History text is empty.
    #[error("history text cannot be empty")]
    HistoryTextEmpty,
    /// History text is longer than the maximum.
    #[error("history text too long (maximum {max} characters)")]
    HistoryTextTooLong {
        /// Maximum length in characters.
        max: usize,
    },
    /// History action label is not one of the known actions.
    #[error("invalid history action: {0}")]
    UnknownAction(String),
    /// A reorder request does not cover the partition exactly.
    #[error("reorder must list every loaded {partition} task exactly once")]
    ReorderMismatch {
        /// Partition being reordered.
        partition: Partition,
    },
}

/// Which due-date rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueDateRule {
    /// Creating a task: past dates are rejected.
    NewTask,
    /// Editing an existing task: past dates are kept as-is.
    Edit,
}

/// Validates task text length in characters.
///
/// # Errors
///
/// Returns [`ValidationError::TextTooShort`] or [`ValidationError::TextTooLong`].
pub fn validate_text(text: &str) -> Result<(), ValidationError> {
    let len = text.chars().count();
    if len < MIN_TASK_TEXT_LENGTH {
        return Err(ValidationError::TextTooShort {
            min: MIN_TASK_TEXT_LENGTH,
        });
    }
    if len > MAX_TASK_TEXT_LENGTH {
        return Err(ValidationError::TextTooLong {
            max: MAX_TASK_TEXT_LENGTH,
        });
    }
    Ok(())
}

/// Start of the UTC day containing `now`.
#[must_use]
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Latest acceptable due date: one calendar year after `now`.
#[must_use]
pub fn latest_due_date(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_add_months(Months::new(12))
        .or_else(|| now.checked_add_days(Days::new(365)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Validates a due date against `now`.
///
/// # Errors
///
/// Returns [`ValidationError::DueDateTooFar`] for dates more than a year
/// ahead, and [`ValidationError::DueDateInPast`] for dates before today
/// when `rule` is [`DueDateRule::NewTask`].
pub fn validate_due_date(
    due: DateTime<Utc>,
    now: DateTime<Utc>,
    rule: DueDateRule,
) -> Result<(), ValidationError> {
    if rule == DueDateRule::NewTask && due < start_of_day(now) {
        return Err(ValidationError::DueDateInPast);
    }
    if due > latest_due_date(now) {
        return Err(ValidationError::DueDateTooFar);
    }
    Ok(())
}

/// Validates a complete task record.
///
/// # Errors
///
/// Returns the first failing field's [`ValidationError`].
pub fn validate_task(
    task: &Task,
    now: DateTime<Utc>,
    rule: DueDateRule,
) -> Result<(), ValidationError> {
    validate_text(&task.text)?;
    if !task.order.is_finite() {
        return Err(ValidationError::InvalidOrder);
    }
    if let Some(due) = task.due_date {
        validate_due_date(due, now, rule)?;
    }
    Ok(())
}

/// Validates history text (non-empty, at most 500 characters).
///
/// # Errors
///
/// Returns [`ValidationError::HistoryTextEmpty`] or
/// [`ValidationError::HistoryTextTooLong`].
pub fn validate_history_text(text: &str) -> Result<(), ValidationError> {
    if text.is_empty() {
        return Err(ValidationError::HistoryTextEmpty);
    }
    if text.chars().count() > MAX_HISTORY_TEXT_LENGTH {
        return Err(ValidationError::HistoryTextTooLong {
            max: MAX_HISTORY_TEXT_LENGTH,
        });
    }
    Ok(())
}
