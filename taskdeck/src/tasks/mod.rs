//! Owner-scoped task synchronization for `TaskDeck`.
//!
//! [`TaskSync`] keeps a local cache of the signed-in owner's tasks in
//! step with a remote [`TaskSource`](taskdeck_proto::source::TaskSource)
//! through paged loads and a live change stream. [`MutationGateway`] is the
//! only write path: it validates, rate-limits, applies local effects
//! optimistically where appropriate and rolls them back on remote failure.

pub mod cache;
pub mod gateway;
pub mod optimistic;
pub mod sync;

pub use cache::TaskCache;
pub use gateway::{MutationGateway, PurgeReport};
pub use optimistic::{Optimistic, Rollback};
pub use sync::{LoadOutcome, TaskSync};

use taskdeck_proto::source::SourceError;
use taskdeck_proto::task::TaskId;
use taskdeck_proto::validation::ValidationError;
use thiserror::Error;

use crate::rate_limit::OperationKind;

/// Errors that can occur during task operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Input failed validation; nothing was written.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    /// The per-owner rate limit for this operation is exhausted.
    #[error("{message}")]
    RateLimited {
        operation: OperationKind,
        message: String,
    },
    /// No task with the given ID is loaded for the current owner.
    #[error("task not found: {0}")]
    NotFound(TaskId),
    /// The remote store rejected or failed the operation.
    #[error("remote operation failed: {0}")]
    Remote(#[from] SourceError),
    /// The operation needs a signed-in owner.
    #[error("no owner is signed in")]
    SignedOut,
}
