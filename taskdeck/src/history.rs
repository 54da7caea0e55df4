//! Per-owner activity log with retention cleanup.
//!
//! [`HistoryLog`] appends [`HistoryEntry`] records for the signed-in owner
//! through a [`HistorySource`]. Entries older than the retention period are
//! deleted in bounded batches, either on demand or from a periodic task
//! started with [`spawn_cleanup_task`](HistoryLog::spawn_cleanup_task).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;

use taskdeck_proto::history::{
    HistoryAction, HistoryEntry, MAX_HISTORY_TEXT_LENGTH, NewHistoryEntry,
};
use taskdeck_proto::source::HistorySource;
use taskdeck_proto::task::OwnerId;
use taskdeck_proto::validation::validate_history_text;

use crate::rate_limit::{OperationKind, RateLimiter};
use crate::tasks::TaskError;

/// Shortest period between scheduled cleanups.
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Retention and batching settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Entries at or before `now - retention` are removed by cleanup.
    pub retention: chrono::Duration,
    /// Rows deleted per remote batch.
    pub cleanup_batch_size: usize,
    /// Rows returned by [`HistoryLog::recent`].
    pub max_items: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            retention: chrono::Duration::days(30),
            cleanup_batch_size: 500,
            max_items: 1000,
        }
    }
}

/// Activity log for the signed-in owner.
pub struct HistoryLog<H: HistorySource> {
    source: Arc<H>,
    limiter: Arc<RateLimiter>,
    config: HistoryConfig,
    owner: RwLock<Option<OwnerId>>,
}

impl<H: HistorySource> HistoryLog<H> {
    #[must_use]
    pub fn new(source: Arc<H>, limiter: Arc<RateLimiter>, config: HistoryConfig) -> Self {
        Self {
            source,
            limiter,
            config,
            owner: RwLock::new(None),
        }
    }

    /// Sets the owner entries are written for.
    pub fn set_owner(&self, owner: Option<OwnerId>) {
        *self.owner.write() = owner;
    }

    #[must_use]
    pub fn owner(&self) -> Option<OwnerId> {
        self.owner.read().clone()
    }

    #[must_use]
    pub const fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Appends an entry for the current owner.
    ///
    /// # Errors
    ///
    /// - [`TaskError::SignedOut`] with nobody signed in.
    /// - [`TaskError::Validation`] if `task_text` is empty or too long.
    /// - [`TaskError::RateLimited`] when the history limit is exhausted.
    /// - [`TaskError::Remote`] if the append fails.
    pub async fn log_action(
        &self,
        action: HistoryAction,
        task_text: &str,
    ) -> Result<HistoryEntry, TaskError> {
        let owner = self.owner().ok_or(TaskError::SignedOut)?;
        validate_history_text(task_text)?;
        self.limiter.check(OperationKind::LogHistory, &owner)?;

        let entry = self
            .source
            .append(NewHistoryEntry {
                owner: owner.clone(),
                action,
                task_text: task_text.to_string(),
            })
            .await
            .map_err(|err| {
                tracing::warn!(%owner, %action, error = %err, "failed to append history entry");
                TaskError::from(err)
            })?;
        tracing::debug!(%owner, %action, id = %entry.id, "history entry appended");
        Ok(entry)
    }

    /// Like [`log_action`](Self::log_action) but takes the display label
    /// of the action.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] for an unknown label, otherwise as
    /// [`log_action`](Self::log_action).
    pub async fn log_action_label(
        &self,
        label: &str,
        task_text: &str,
    ) -> Result<HistoryEntry, TaskError> {
        let action: HistoryAction = label.parse()?;
        self.log_action(action, task_text).await
    }

    /// Deletes expired entries, or every entry when `clear_all` is set.
    ///
    /// Deletes in batches until a batch comes back short. Returns the
    /// number of entries removed; `0` with nobody signed in.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if a batch fails. Batches already
    /// committed stay deleted.
    pub async fn cleanup_old_history(&self, clear_all: bool) -> Result<usize, TaskError> {
        let Some(owner) = self.owner() else {
            return Ok(0);
        };
        let cutoff = (!clear_all).then(|| Utc::now() - self.config.retention);
        let batch = self.config.cleanup_batch_size.max(1);

        let mut total = 0;
        loop {
            let deleted = self
                .source
                .delete_batch(&owner, cutoff, batch)
                .await
                .map_err(|err| {
                    tracing::warn!(%owner, error = %err, deleted = total, "history cleanup failed");
                    TaskError::from(err)
                })?;
            total += deleted;
            if deleted < batch {
                break;
            }
        }

        if total > 0 {
            tracing::info!(%owner, deleted = total, clear_all, "history cleaned up");
        }
        Ok(total)
    }

    /// Most recent entries of the current owner, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if the query fails.
    pub async fn recent(&self) -> Result<Vec<HistoryEntry>, TaskError> {
        let Some(owner) = self.owner() else {
            return Ok(Vec::new());
        };
        Ok(self.source.recent(&owner, self.config.max_items).await?)
    }

    /// Runs [`cleanup_old_history`](Self::cleanup_old_history) every
    /// `interval`, starting immediately. Failures are logged.
    ///
    /// `interval` is raised to [`MIN_CLEANUP_INTERVAL`] if shorter.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        H: 'static,
    {
        let log = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval.max(MIN_CLEANUP_INTERVAL));
            loop {
                tick.tick().await;
                if let Err(err) = log.cleanup_old_history(false).await {
                    tracing::warn!(error = %err, "scheduled history cleanup failed");
                }
            }
        })
    }
}

/// History text for an edit, truncated to the history text limit.
#[must_use]
pub fn edit_summary(old: &str, new: &str) -> String {
    let summary = format!("Changed from \"{old}\" to \"{new}\"");
    if summary.chars().count() <= MAX_HISTORY_TEXT_LENGTH {
        return summary;
    }
    let mut truncated: String = summary.chars().take(MAX_HISTORY_TEXT_LENGTH - 3).collect();
    truncated.push_str("...");
    truncated
}
