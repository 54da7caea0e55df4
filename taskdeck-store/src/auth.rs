//! In-memory auth provider.
//!
//! Sign-in and sign-out are plain method calls; every change is pushed
//! through a [`watch`] channel so that sessions can follow the owner.

use tokio::sync::watch;

use taskdeck_proto::source::AuthProvider;
use taskdeck_proto::task::OwnerId;

/// Auth provider whose signed-in owner is set directly.
pub struct MemoryAuth {
    owner: watch::Sender<Option<OwnerId>>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    /// Creates a provider with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        let (owner, _) = watch::channel(None);
        Self { owner }
    }

    /// Signs `owner` in, replacing any current owner.
    pub fn sign_in(&self, owner: OwnerId) {
        tracing::info!(%owner, "signed in");
        self.owner.send_replace(Some(owner));
    }

    /// Signs the current owner out.
    pub fn sign_out(&self) {
        if let Some(previous) = self.owner.send_replace(None) {
            tracing::info!(owner = %previous, "signed out");
        }
    }
}

impl AuthProvider for MemoryAuth {
    fn current_owner(&self) -> Option<OwnerId> {
        self.owner.borrow().clone()
    }

    fn watch_owner(&self) -> watch::Receiver<Option<OwnerId>> {
        self.owner.subscribe()
    }
}
