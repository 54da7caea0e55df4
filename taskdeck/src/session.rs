//! Follows the signed-in owner and rewires sync and history on change.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use taskdeck_proto::source::{AuthProvider, HistorySource, TaskSource};
use taskdeck_proto::task::OwnerId;

use crate::history::HistoryLog;
use crate::rate_limit::RateLimiter;
use crate::tasks::{TaskError, TaskSync};

/// Drives a [`TaskSync`] and a [`HistoryLog`] from auth state.
///
/// Each owner change resets the cache, points the history log at the new
/// owner and restarts the periodic history cleanup.
pub struct SessionController<S: TaskSource, H: HistorySource> {
    sync: Arc<TaskSync<S>>,
    history: Arc<HistoryLog<H>>,
    limiter: Arc<RateLimiter>,
    cleanup_interval: Duration,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: TaskSource, H: HistorySource> Drop for SessionController<S, H> {
    fn drop(&mut self) {
        if let Some(task) = self.cleanup_task.get_mut().take() {
            task.abort();
        }
    }
}

impl<S, H> SessionController<S, H>
where
    S: TaskSource + 'static,
    H: HistorySource + 'static,
{
    #[must_use]
    pub fn new(
        sync: Arc<TaskSync<S>>,
        history: Arc<HistoryLog<H>>,
        limiter: Arc<RateLimiter>,
        cleanup_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            sync,
            history,
            limiter,
            cleanup_interval,
            cleanup_task: Mutex::new(None),
        })
    }

    /// Switches every component to `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Remote`] if the change subscription for the new
    /// owner cannot be opened.
    pub fn apply_owner(&self, owner: Option<OwnerId>) -> Result<(), TaskError> {
        if let Some(task) = self.cleanup_task.lock().take() {
            task.abort();
        }
        if let Some(previous) = self.history.owner().filter(|p| owner.as_ref() != Some(p)) {
            self.limiter.forget(&previous);
        }

        self.history.set_owner(owner.clone());
        let signed_in = owner.is_some();
        let result = self.sync.switch_owner(owner);
        if signed_in {
            *self.cleanup_task.lock() = Some(self.history.spawn_cleanup_task(self.cleanup_interval));
        }
        result
    }

    /// Applies the current owner of `auth` and keeps following it.
    ///
    /// The returned task ends when the auth provider goes away.
    ///
    /// # Errors
    ///
    /// Returns the error of applying the initial owner.
    pub fn follow<A: AuthProvider>(self: &Arc<Self>, auth: &A) -> Result<JoinHandle<()>, TaskError> {
        let mut owners = auth.watch_owner();
        let initial = owners.borrow_and_update().clone();
        self.apply_owner(initial)?;

        let controller = Arc::clone(self);
        Ok(tokio::spawn(async move {
            while owners.changed().await.is_ok() {
                let owner = owners.borrow_and_update().clone();
                if let Err(err) = controller.apply_owner(owner) {
                    tracing::warn!(error = %err, "failed to start session for new owner");
                }
            }
            tracing::debug!("auth provider closed");
        }))
    }

    #[must_use]
    pub const fn sync(&self) -> &Arc<TaskSync<S>> {
        &self.sync
    }

    #[must_use]
    pub const fn history(&self) -> &Arc<HistoryLog<H>> {
        &self.history
    }
}
