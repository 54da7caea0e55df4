//! Per-owner sliding-window rate limiting for write operations.
//!
//! Each [`OperationKind`] has its own window. A call is admitted when the
//! number of admitted calls for the same owner and operation in the last
//! `window` is below `max`; rejected calls are not counted.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use taskdeck_proto::task::OwnerId;

use crate::tasks::TaskError;

/// Operations subject to rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateTask,
    UpdateTask,
    DeleteTask,
    LogHistory,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateTask => write!(f, "create_task"),
            Self::UpdateTask => write!(f, "update_task"),
            Self::DeleteTask => write!(f, "delete_task"),
            Self::LogHistory => write!(f, "log_history"),
        }
    }
}

/// Limit for one operation kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimit {
    /// Calls admitted per window.
    pub max: usize,
    /// Length of the sliding window.
    pub window: Duration,
    /// Message carried by the rejection error.
    pub message: String,
}

impl RateLimit {
    #[must_use]
    pub fn new(max: usize, window: Duration, message: impl Into<String>) -> Self {
        Self {
            max,
            window,
            message: message.into(),
        }
    }
}

/// Limits for every [`OperationKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimits {
    pub create: RateLimit,
    pub update: RateLimit,
    pub delete: RateLimit,
    pub log_history: RateLimit,
}

impl Default for RateLimits {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        Self {
            create: RateLimit::new(
                15,
                minute,
                "Too many tasks created. Please wait a minute before adding more.",
            ),
            update: RateLimit::new(
                15,
                minute,
                "Too many task updates. Please wait a minute before editing again.",
            ),
            delete: RateLimit::new(
                15,
                minute,
                "Too many tasks deleted. Please wait a minute before deleting more.",
            ),
            log_history: RateLimit::new(
                25,
                minute,
                "Too many history entries. Please wait a minute.",
            ),
        }
    }
}

impl RateLimits {
    /// Returns the limit for `operation`.
    #[must_use]
    pub const fn get(&self, operation: OperationKind) -> &RateLimit {
        match operation {
            OperationKind::CreateTask => &self.create,
            OperationKind::UpdateTask => &self.update,
            OperationKind::DeleteTask => &self.delete,
            OperationKind::LogHistory => &self.log_history,
        }
    }
}

/// Sliding-window limiter keyed by owner and operation.
pub struct RateLimiter {
    limits: RateLimits,
    admitted: Mutex<HashMap<(OperationKind, OwnerId), VecDeque<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimits::default())
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            admitted: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn limits(&self) -> &RateLimits {
        &self.limits
    }

    /// Admits one `operation` call for `owner`, or rejects it.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::RateLimited`] when the window is full.
    pub fn check(&self, operation: OperationKind, owner: &OwnerId) -> Result<(), TaskError> {
        self.check_at(operation, owner, Instant::now())
    }

    /// Same as [`check`](Self::check) with an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::RateLimited`] when the window is full.
    pub fn check_at(
        &self,
        operation: OperationKind,
        owner: &OwnerId,
        now: Instant,
    ) -> Result<(), TaskError> {
        let limit = self.limits.get(operation);
        let mut admitted = self.admitted.lock();
        let window = admitted.entry((operation, owner.clone())).or_default();

        while window
            .front()
            .is_some_and(|at| now.saturating_duration_since(*at) >= limit.window)
        {
            window.pop_front();
        }

        if window.len() >= limit.max {
            tracing::warn!(%operation, %owner, max = limit.max, "rate limit exceeded");
            return Err(TaskError::RateLimited {
                operation,
                message: limit.message.clone(),
            });
        }

        window.push_back(now);
        Ok(())
    }

    /// Drops every recorded call for `owner`.
    pub fn forget(&self, owner: &OwnerId) {
        self.admitted.lock().retain(|(_, o), _| o != owner);
    }
}
