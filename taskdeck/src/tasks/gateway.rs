//! The single write path for tasks.
//!
//! Every mutation is checked against validation rules and the per-owner
//! rate limit before anything is written. Creates are remote-first: the
//! task enters the cache once the store has assigned its id. Updates,
//! deletes and reorders are applied to the cache first and rolled back if
//! the remote write fails.
//!
//! Writes that pick an order value (creates, completion toggles and
//! reorders) run one at a time, so two of them never read the same front
//! of a partition.
//!
//! A successful mutation is recorded in the history log. A failure to
//! record it is logged and does not fail the mutation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use taskdeck_proto::history::HistoryAction;
use taskdeck_proto::source::{HistorySource, TaskSource};
use taskdeck_proto::task::{
    NewTask, OrderUpdate, OwnerId, Partition, Task, TaskId, TaskPatch, front_order,
};
use taskdeck_proto::validation::{
    DueDateRule, ValidationError, validate_due_date, validate_task, validate_text,
};

use super::TaskError;
use super::optimistic::Rollback;
use super::sync::TaskSync;
use crate::bus::MutationKind;
use crate::history::{HistoryLog, edit_summary};
use crate::rate_limit::{OperationKind, RateLimiter};

/// What [`MutationGateway::purge`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub tasks: usize,
    pub history: usize,
}

/// Validated, rate-limited task writes for the signed-in owner.
pub struct MutationGateway<S: TaskSource, H: HistorySource> {
    sync: Arc<TaskSync<S>>,
    history: Arc<HistoryLog<H>>,
    limiter: Arc<RateLimiter>,
    /// Held from reading a partition's orders until the write lands.
    order_lock: Mutex<()>,
}

impl<S, H> MutationGateway<S, H>
where
    S: TaskSource + 'static,
    H: HistorySource,
{
    #[must_use]
    pub fn new(
        sync: Arc<TaskSync<S>>,
        history: Arc<HistoryLog<H>>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            sync,
            history,
            limiter,
            order_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn sync(&self) -> &Arc<TaskSync<S>> {
        &self.sync
    }

    fn owner(&self) -> Result<OwnerId, TaskError> {
        self.sync.owner().ok_or(TaskError::SignedOut)
    }

    /// Creates a pending task at the front of the pending list.
    ///
    /// `text` is trimmed before validation.
    ///
    /// # Errors
    ///
    /// - [`TaskError::SignedOut`] with nobody signed in.
    /// - [`TaskError::Validation`] for bad text or due date.
    /// - [`TaskError::RateLimited`] when the create limit is exhausted.
    /// - [`TaskError::Remote`] if the store rejects the insert.
    pub async fn create(
        &self,
        text: &str,
        due_date: Option<DateTime<Utc>>,
    ) -> Result<Task, TaskError> {
        let owner = self.owner()?;
        let text = text.trim();
        validate_text(text)?;
        if let Some(due) = due_date {
            validate_due_date(due, Utc::now(), DueDateRule::NewTask)?;
        }
        self.limiter.check(OperationKind::CreateTask, &owner)?;

        let order_guard = self.order_lock.lock().await;
        self.load_front(Partition::Pending).await?;
        let (epoch, order) = self
            .sync
            .read(|c| (c.epoch(), front_order(c.members(Partition::Pending))));

        let task = self
            .sync
            .source()
            .insert(NewTask {
                owner: owner.clone(),
                text: text.to_string(),
                completed: false,
                order,
                due_date,
            })
            .await
            .map_err(|err| {
                tracing::warn!(%owner, error = %err, "task insert failed");
                TaskError::from(err)
            })?;
        self.sync.insert_confirmed(epoch, task.clone());
        drop(order_guard);
        tracing::info!(%owner, id = %task.id, order, "task created");

        self.record(HistoryAction::Created, &task.text).await;
        Ok(task)
    }

    /// Applies `patch` to a loaded task.
    ///
    /// Toggling `completed` moves the task to the front of its new
    /// partition. Due dates in the past are accepted here.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is not loaded.
    /// - [`TaskError::Validation`] if the patched task is invalid.
    /// - [`TaskError::RateLimited`] when the update limit is exhausted.
    /// - [`TaskError::Remote`] if the store write fails; the cache is
    ///   restored.
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, TaskError> {
        let owner = self.owner()?;
        let order_guard = if patch.completed.is_some() {
            Some(self.order_lock.lock().await)
        } else {
            None
        };
        let current = self.sync.get(id).ok_or_else(|| TaskError::NotFound(id.clone()))?;
        if patch.is_empty() {
            return Ok(current);
        }

        let mut patch = patch;
        if let Some(text) = patch.text.take() {
            patch.text = Some(text.trim().to_string());
        }
        let toggled = patch.completed.is_some_and(|c| c != current.completed);
        if toggled {
            let target = Partition::of(!current.completed);
            self.load_front(target).await?;
            patch.order = Some(self.sync.read(|c| front_order(c.members(target))));
        }
        let updated = patch.apply_to(&current);
        validate_task(&updated, Utc::now(), DueDateRule::Edit)?;
        self.limiter.check(OperationKind::UpdateTask, &owner)?;

        let optimistic = self
            .sync
            .apply_optimistic(MutationKind::Update, Some(id.clone()), |cache| {
                cache.replace(updated.clone()).map(Rollback::Restore)
            })
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;
        optimistic
            .settle(&self.sync, self.sync.source().update(id, patch))
            .await?;
        drop(order_guard);
        tracing::info!(%owner, %id, toggled, "task updated");

        if toggled {
            let action = if updated.completed {
                HistoryAction::Completed
            } else {
                HistoryAction::MarkedIncomplete
            };
            self.record(action, &current.text).await;
        } else if updated.text != current.text {
            self.record(HistoryAction::Edited, &edit_summary(&current.text, &updated.text))
                .await;
        }
        Ok(updated)
    }

    /// Deletes a loaded task.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] if the task is not loaded.
    /// - [`TaskError::RateLimited`] when the delete limit is exhausted.
    /// - [`TaskError::Remote`] if the store write fails; the task is
    ///   restored.
    pub async fn delete(&self, id: &TaskId) -> Result<Task, TaskError> {
        let owner = self.owner()?;
        if self.sync.get(id).is_none() {
            return Err(TaskError::NotFound(id.clone()));
        }
        self.limiter.check(OperationKind::DeleteTask, &owner)?;

        let removed = self.delete_unchecked(id).await?;
        tracing::info!(%owner, %id, "task deleted");
        self.record(HistoryAction::Deleted, &removed.text).await;
        Ok(removed)
    }

    async fn delete_unchecked(&self, id: &TaskId) -> Result<Task, TaskError> {
        let mut removed = None;
        let optimistic = self
            .sync
            .apply_optimistic(MutationKind::Delete, Some(id.clone()), |cache| {
                let task = cache.remove(id)?;
                removed = Some(task.clone());
                Some(Rollback::Reinsert(task))
            })
            .ok_or_else(|| TaskError::NotFound(id.clone()))?;
        optimistic
            .settle(&self.sync, self.sync.source().delete(id))
            .await?;
        removed.ok_or_else(|| TaskError::NotFound(id.clone()))
    }

    /// Reorders `partition` to match `ordered_ids`.
    ///
    /// Remaining pages of `partition` are loaded first, then `ordered_ids`
    /// must list every member of `partition` exactly once. Members get their index as order value; only tasks whose
    /// value changes are written, in one atomic batch. Returns the number
    /// of tasks written.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotFound`] for an id that is not loaded.
    /// - [`TaskError::Validation`] if `ordered_ids` does not match the
    ///   partition.
    /// - [`TaskError::RateLimited`] when the update limit is exhausted.
    /// - [`TaskError::Remote`] if loading the partition or the batch fails;
    ///   previous orders are restored.
    pub async fn reorder(
        &self,
        partition: Partition,
        ordered_ids: &[TaskId],
    ) -> Result<usize, TaskError> {
        let owner = self.owner()?;
        let _order_guard = self.order_lock.lock().await;
        self.sync.load_all(partition).await?;
        let members = self.sync.partition(partition);

        let mismatch = || TaskError::Validation(ValidationError::ReorderMismatch { partition });
        let mut seen = HashSet::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if self.sync.get(id).is_none() {
                return Err(TaskError::NotFound(id.clone()));
            }
            if !seen.insert(id) || !members.iter().any(|t| &t.id == id) {
                return Err(mismatch());
            }
        }
        if seen.len() != members.len() {
            return Err(mismatch());
        }

        let updates: Vec<OrderUpdate> = ordered_ids
            .iter()
            .zip(0u32..)
            .filter_map(|(id, index)| {
                let order = f64::from(index);
                let current = members.iter().find(|t| &t.id == id)?;
                current.order.total_cmp(&order).is_ne().then(|| OrderUpdate {
                    id: id.clone(),
                    order,
                })
            })
            .collect();
        if updates.is_empty() {
            tracing::debug!(%partition, "reorder is a no-op");
            return Ok(0);
        }
        self.limiter.check(OperationKind::UpdateTask, &owner)?;

        let optimistic = self
            .sync
            .apply_optimistic(MutationKind::Reorder, None, |cache| {
                Some(Rollback::Reorder(cache.set_orders(&updates)))
            })
            .ok_or(TaskError::SignedOut)?;
        let written = updates.len();
        optimistic
            .settle(&self.sync, self.sync.source().update_orders(updates))
            .await?;
        tracing::info!(%owner, %partition, written, "tasks reordered");
        Ok(written)
    }

    /// Deletes every loaded pending task.
    ///
    /// Consumes one delete token for the whole operation. Stops at the
    /// first failing delete; tasks deleted before it stay deleted.
    /// Returns the number of tasks removed.
    ///
    /// # Errors
    ///
    /// - [`TaskError::RateLimited`] when the delete limit is exhausted.
    /// - [`TaskError::Remote`] if a delete fails.
    pub async fn clear_pending(&self) -> Result<usize, TaskError> {
        let owner = self.owner()?;
        let pending = self.sync.pending();
        if pending.is_empty() {
            return Ok(0);
        }
        self.limiter.check(OperationKind::DeleteTask, &owner)?;

        let mut cleared = 0;
        for task in &pending {
            self.delete_unchecked(&task.id).await?;
            cleared += 1;
        }
        tracing::info!(%owner, cleared, "pending tasks cleared");

        let summary = if cleared == 1 {
            "1 pending task".to_string()
        } else {
            format!("{cleared} pending tasks")
        };
        self.record(HistoryAction::ClearedPending, &summary).await;
        Ok(cleared)
    }

    /// Deletes all of the owner's tasks and history.
    ///
    /// Loads any remaining pages first so that unloaded tasks are removed
    /// too. Not rate limited.
    ///
    /// # Errors
    ///
    /// Returns the first load or delete failure.
    pub async fn purge(&self) -> Result<PurgeReport, TaskError> {
        let owner = self.owner()?;
        for partition in Partition::ALL {
            self.sync.load_all(partition).await?;
        }

        let mut report = PurgeReport::default();
        for task in self.sync.all() {
            self.delete_unchecked(&task.id).await?;
            report.tasks += 1;
        }
        report.history = self.history.cleanup_old_history(true).await?;
        tracing::info!(%owner, tasks = report.tasks, history = report.history, "account data purged");
        Ok(report)
    }

    /// Loads the first page of `partition` if nothing of it is loaded yet.
    ///
    /// Pages are ordered, so after this the loaded minimum is the
    /// partition's minimum.
    async fn load_front(&self, partition: Partition) -> Result<(), TaskError> {
        if self
            .sync
            .read(|c| c.cursor(partition).is_none() && c.has_more(partition))
        {
            self.sync.load_page(partition).await?;
        }
        Ok(())
    }

    async fn record(&self, action: HistoryAction, text: &str) {
        if let Err(err) = self.history.log_action(action, text).await {
            tracing::warn!(%action, error = %err, "task saved but history entry was not recorded");
        }
    }
}
