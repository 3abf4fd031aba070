//! Typed publish/subscribe list with synchronous, in-order delivery.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, error};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Subscribers<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Fans a payload out to every registered callback.
///
/// Clones share the same subscriber list. There is no queue: a callback only
/// sees payloads published while it is registered.
pub struct Broadcaster<T> {
    inner: Arc<Mutex<Subscribers<T>>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Callbacks never run under the lock, so a poisoned list is still consistent.
fn lock<T>(inner: &Mutex<Subscribers<T>>) -> MutexGuard<'_, Subscribers<T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> Broadcaster<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Subscribers {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Registers `callback` after all existing subscribers.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let mut subscribers = lock(&self.inner);
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, Arc::new(callback)));
        debug!(subscription_id = id, "subscriber registered");

        let weak: Weak<Mutex<Subscribers<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            remove: Some(Box::new(move |id| {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).entries.retain(|(entry_id, _)| *entry_id != id);
                }
            })),
        }
    }

    /// Delivers `payload` to a snapshot of the current subscribers, in
    /// registration order. A panicking callback is logged and skipped.
    pub fn publish(&self, payload: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = lock(&self.inner).entries.clone();
        debug!(
            event_name = "session.broadcast.publish",
            event_domain = "session",
            subscribers = snapshot.len(),
            "publishing session change"
        );

        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                error!(
                    event_name = "session.broadcast.subscriber_panic",
                    event_domain = "session",
                    subscription_id = id,
                    "subscriber panicked; continuing delivery"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).entries.len()
    }
}

/// Handle returned by `Broadcaster::subscribe`. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    remove: Option<Box<dyn FnOnce(u64) + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(mut self) {
        self.remove_now();
    }

    /// Keeps the callback registered for as long as the broadcaster lives.
    pub fn detach(mut self) {
        self.remove = None;
    }

    fn remove_now(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove(self.id);
            debug!(subscription_id = self.id, "subscriber removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.remove.is_some())
            .finish()
    }
}
