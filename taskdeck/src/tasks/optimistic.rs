//! Optimistic local effects and their rollback.
//!
//! A write that is applied locally before the remote store confirms it
//! produces an [`Optimistic`] handle. Settling the handle with the remote
//! result either keeps the local effect or restores the captured state.

use std::future::Future;

use taskdeck_proto::source::{SourceError, TaskSource};
use taskdeck_proto::task::{OrderUpdate, Task};

use super::TaskError;
use super::cache::TaskCache;
use super::sync::TaskSync;
use crate::bus::MutationKind;

/// Pre-mutation state captured by an optimistic write.
#[derive(Debug, Clone, PartialEq)]
pub enum Rollback {
    /// Put back a task that was removed.
    Reinsert(Task),
    /// Restore a task's previous record.
    Restore(Task),
    /// Restore previous order values.
    Reorder(Vec<OrderUpdate>),
}

impl Rollback {
    /// Writes the captured state back into `cache`.
    pub fn apply(self, cache: &mut TaskCache) {
        match self {
            Self::Reinsert(task) => {
                cache.restore(task);
            }
            Self::Restore(task) => {
                cache.replace(task);
            }
            Self::Reorder(previous) => {
                cache.set_orders(&previous);
            }
        }
    }
}

/// A local effect awaiting remote confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct Optimistic {
    pub(crate) epoch: u64,
    pub(crate) mutation: MutationKind,
    pub(crate) rollback: Rollback,
}

impl Optimistic {
    #[must_use]
    pub const fn mutation(&self) -> MutationKind {
        self.mutation
    }

    /// Awaits `remote` and rolls the local effect back if it fails.
    ///
    /// The rollback is skipped when the session changed in the meantime.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] with the remote failure.
    pub async fn settle<S, T>(
        self,
        sync: &TaskSync<S>,
        remote: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, TaskError>
    where
        S: TaskSource + 'static,
    {
        match remote.await {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(
                    mutation = %self.mutation,
                    error = %err,
                    "remote write failed, rolling back local change"
                );
                sync.roll_back(self);
                Err(err.into())
            }
        }
    }
}
