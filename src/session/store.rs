use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::broadcaster::{Broadcaster, Subscription};
use crate::config::SessionConfig;
use crate::models::{ChangeNotification, User};
use crate::storage::{Storage, StorageError};
use crate::utils::log_throttle::should_emit;

const STORAGE_WARN_WINDOW: Duration = Duration::from_secs(30);

/// Sole authority over the persisted token/user pair.
///
/// Every mutation goes through `set_auth` or `clear_auth`, which finish
/// writing before they publish. Storage failures never reach the caller:
/// the outcome is kept in an in-process overlay instead, and reads consult
/// that overlay before the medium.
///
/// Mutations are serialized, and callbacks run while the write lock is held,
/// so every subscriber sees notifications in write order. A callback may read
/// the store but must not call `set_auth` or `clear_auth` itself.
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    keys: SessionConfig,
    broadcaster: Broadcaster<ChangeNotification>,
    // `None` marks a key whose removal failed on the medium.
    fallback: Mutex<HashMap<String, Option<String>>>,
    write_lock: Mutex<()>,
    epoch: AtomicU64,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, keys: SessionConfig) -> Self {
        if !storage.is_enabled() {
            info!("Session storage is not available; session will live in memory only.");
        }
        Self {
            storage,
            keys,
            broadcaster: Broadcaster::new(),
            fallback: Mutex::new(HashMap::new()),
            write_lock: Mutex::new(()),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn get_token(&self) -> Option<String> {
        self.read(&self.keys.token_key)
    }

    /// Cached user, or `None` when absent or not parseable.
    pub fn get_user(&self) -> Option<User> {
        let raw = self.read(&self.keys.user_key)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                debug!("Ignoring malformed cached user: {}", e);
                None
            }
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.get_user().is_some()
    }

    /// Stores (or removes) both values, then notifies `{user, loggedIn: user.is_some()}`.
    ///
    /// An empty token is treated as no token.
    pub fn set_auth(&self, token: Option<&str>, user: Option<&User>) {
        let _guard = self.lock_writes();
        self.apply_set(token, user);
    }

    /// Removes both values, then notifies `{loggedIn: false}`.
    pub fn clear_auth(&self) {
        let _guard = self.lock_writes();
        self.apply_clear();
    }

    /// `set_auth`, but only if no mutation happened since `epoch` was read.
    ///
    /// Returns whether the write went through.
    pub fn set_auth_if_unchanged(
        &self,
        epoch: u64,
        token: Option<&str>,
        user: Option<&User>,
    ) -> bool {
        let _guard = self.lock_writes();
        if self.epoch() != epoch {
            return false;
        }
        self.apply_set(token, user);
        true
    }

    /// `clear_auth`, but only if no mutation happened since `epoch` was read.
    pub fn clear_auth_if_unchanged(&self, epoch: u64) -> bool {
        let _guard = self.lock_writes();
        if self.epoch() != epoch {
            return false;
        }
        self.apply_clear();
        true
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ChangeNotification) + Send + Sync + 'static,
    {
        self.broadcaster.subscribe(callback)
    }

    /// Number of `set_auth`/`clear_auth` calls so far.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Callers hold the write lock.
    fn apply_set(&self, token: Option<&str>, user: Option<&User>) {
        let token = token.filter(|t| !t.is_empty());
        match token {
            Some(token) => self.write(&self.keys.token_key, token),
            None => self.remove(&self.keys.token_key),
        }
        match user.map(serde_json::to_string) {
            Some(Ok(json)) => self.write(&self.keys.user_key, &json),
            Some(Err(e)) => {
                warn!("Could not serialize user for caching: {}", e);
                self.remove(&self.keys.user_key);
            }
            None => self.remove(&self.keys.user_key),
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);

        info!(
            event_name = "session.set_auth",
            event_domain = "session",
            has_token = token.is_some(),
            logged_in = user.is_some(),
            "session updated"
        );
        self.broadcaster
            .publish(&ChangeNotification::from_user(user.cloned()));
    }

    // Callers hold the write lock.
    fn apply_clear(&self) {
        self.remove(&self.keys.token_key);
        self.remove(&self.keys.user_key);
        self.epoch.fetch_add(1, Ordering::SeqCst);

        info!(
            event_name = "session.clear_auth",
            event_domain = "session",
            "session cleared"
        );
        self.broadcaster.publish(&ChangeNotification::logged_out());
    }

    fn read(&self, key: &str) -> Option<String> {
        if let Some(overlay) = self.fallback_lock().get(key) {
            return overlay.clone();
        }
        match self.storage.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                self.report(key, "read", &e);
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        match self.storage.set_item(key, value) {
            Ok(()) => self.fallback_clear(key),
            Err(e) => {
                self.report(key, "write", &e);
                self.fallback_lock()
                    .insert(key.to_string(), Some(value.to_string()));
            }
        }
    }

    fn remove(&self, key: &str) {
        match self.storage.remove_item(key) {
            Ok(()) => self.fallback_clear(key),
            Err(e) => {
                self.report(key, "remove", &e);
                self.fallback_lock().insert(key.to_string(), None);
            }
        }
    }

    fn fallback_lock(&self) -> MutexGuard<'_, HashMap<String, Option<String>>> {
        self.fallback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fallback_clear(&self, key: &str) {
        self.fallback_lock().remove(key);
    }

    fn report(&self, key: &str, op: &str, error: &StorageError) {
        // Disabled storage fails on every call by construction; keep that quiet.
        if !self.storage.is_enabled() {
            debug!("Storage unavailable for {} of '{}'", op, key);
            return;
        }
        let throttle_key = format!("session.storage.{}.{}", op, key);
        if let Some(suppressed_count) = should_emit(&throttle_key, STORAGE_WARN_WINDOW) {
            warn!(
                event_name = "session.storage.failure",
                event_domain = "session",
                storage_key = key,
                operation = op,
                suppressed_count,
                "storage {} failed, using in-memory fallback: {}",
                op,
                error
            );
        }
    }
}
