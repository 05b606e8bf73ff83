//! Pending request registry
//!
//! Maps opaque callback ids to the login waiting on them. Each entry owns a
//! one-shot resolution channel and a deadline timer. Settling an entry
//! removes it first, so an id is resolved or rejected at most once and later
//! events for the same id are silently ignored.

use super::handler::CallbackHandler;
use super::types::{AuthError, AuthResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

/// Receiving half of a pending callback
pub type Resolution = oneshot::Receiver<AuthResult<Url>>;

struct PendingEntry {
    handler: Option<Arc<dyn CallbackHandler>>,
    sender: oneshot::Sender<AuthResult<Url>>,
    deadline: Option<JoinHandle<()>>,
    dispatched: bool,
}

impl PendingEntry {
    fn settle(self, outcome: AuthResult<Url>) {
        if let Some(deadline) = self.deadline {
            deadline.abort();
        }
        // The waiter may have been dropped; nothing left to notify then.
        let _ = self.sender.send(outcome);
    }
}

/// An entry claimed by an incoming browser request
pub struct ClaimedCallback {
    pub handler: Option<Arc<dyn CallbackHandler>>,
}

/// In-memory id → pending login map
#[derive(Default)]
pub struct PendingRegistry {
    entries: Mutex<HashMap<String, PendingEntry>>,
}

impl PendingRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a new pending entry.
    ///
    /// After `timeout` the entry is rejected with [`AuthError::Timeout`] and
    /// `on_timeout` runs. Must be called from within a tokio runtime.
    pub fn register<F>(
        self: &Arc<Self>,
        id: &str,
        handler: Option<Arc<dyn CallbackHandler>>,
        timeout: Duration,
        on_timeout: F,
    ) -> AuthResult<Resolution>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut entries = self.entries.lock();
        if entries.contains_key(id) {
            return Err(AuthError::DuplicateId(id.to_string()));
        }

        let (sender, receiver) = oneshot::channel();
        let deadline = tokio::spawn(expire_after(
            Arc::downgrade(self),
            id.to_string(),
            timeout,
            on_timeout,
        ));

        entries.insert(
            id.to_string(),
            PendingEntry {
                handler,
                sender,
                deadline: Some(deadline),
                dispatched: false,
            },
        );
        debug!("Registered pending callback {}", id);
        Ok(receiver)
    }

    /// Resolve `id` with the final request URL; unknown ids are ignored
    pub fn resolve(&self, id: &str, url: Url) -> bool {
        match self.take(id) {
            Some(entry) => {
                debug!("Resolved pending callback {}", id);
                entry.settle(Ok(url));
                true
            }
            None => false,
        }
    }

    /// Reject `id` with `err`; unknown ids are ignored
    pub fn reject(&self, id: &str, err: AuthError) -> bool {
        match self.take(id) {
            Some(entry) => {
                debug!("Rejected pending callback {}: {}", id, err);
                entry.settle(Err(err));
                true
            }
            None => false,
        }
    }

    /// Reject `id` because the consumer stopped waiting
    pub fn cancel(&self, id: &str) -> bool {
        self.reject(id, AuthError::Cancelled)
    }

    /// Reject every pending entry with `err`, returning how many there were
    pub fn drain_all(&self, err: AuthError) -> usize {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            debug!("Draining pending callback {}: {}", id, err);
            entry.settle(Err(err.clone()));
        }
        count
    }

    /// Claim `id` for dispatch by an incoming request.
    ///
    /// Returns `None` for unknown, expired, settled or already claimed ids.
    /// A claimed entry stays counted as pending but no longer times out.
    pub fn claim(&self, id: &str) -> Option<ClaimedCallback> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(id)?;
        if entry.dispatched {
            return None;
        }
        entry.dispatched = true;
        if let Some(deadline) = entry.deadline.take() {
            deadline.abort();
        }
        Some(ClaimedCallback {
            handler: entry.handler.clone(),
        })
    }

    /// Entries that are registered and not yet settled
    pub fn pending_count(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    fn take(&self, id: &str) -> Option<PendingEntry> {
        self.entries.lock().remove(id)
    }

    /// Deadline path: remove without aborting the timer task that is running it
    fn expire(&self, id: &str) -> bool {
        match self.take(id) {
            Some(mut entry) => {
                debug!("Pending callback {} timed out", id);
                entry.deadline = None;
                entry.settle(Err(AuthError::Timeout));
                true
            }
            None => false,
        }
    }
}

async fn expire_after<F>(registry: Weak<PendingRegistry>, id: String, timeout: Duration, on_timeout: F)
where
    F: FnOnce(),
{
    tokio::time::sleep(timeout).await;
    if let Some(registry) = registry.upgrade() {
        if registry.expire(&id) {
            on_timeout();
        }
    }
}
