//! The mount/subscribe contract every session-aware fragment follows.
//!
//! On mount an observer derives its view from the cached user, else from a
//! profile fetch with the cached token, else it is logged out. From then on
//! it follows the store's change notifications until unmounted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::broadcaster::Subscription;
use super::store::SessionStore;
use crate::backend::ProfileFetcher;
use crate::models::{ChangeNotification, User};

#[derive(Debug, Clone, PartialEq)]
pub enum ObserverState {
    Bootstrapping,
    LoggedOut,
    LoggedIn(User),
}

impl ObserverState {
    pub fn user(&self) -> Option<&User> {
        match self {
            ObserverState::LoggedIn(user) => Some(user),
            _ => None,
        }
    }

    fn apply(&mut self, notification: &ChangeNotification) {
        if !notification.logged_in {
            *self = ObserverState::LoggedOut;
        } else if let Some(user) = &notification.user {
            *self = ObserverState::LoggedIn(user.clone());
        }
    }
}

struct LocalView {
    state: ObserverState,
    mounted: bool,
}

fn lock(view: &Mutex<LocalView>) -> MutexGuard<'_, LocalView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One independently mounted view of the session (a header, a banner, a profile screen).
pub struct SessionObserver {
    id: Uuid,
    label: String,
    session: Arc<SessionStore>,
    profile: Arc<dyn ProfileFetcher>,
    view: Arc<Mutex<LocalView>>,
    subscription: Mutex<Option<Subscription>>,
}

impl SessionObserver {
    /// Creates the observer in `Bootstrapping` and subscribes right away, so
    /// no change published during the bootstrap is missed.
    pub fn new(
        label: impl Into<String>,
        session: Arc<SessionStore>,
        profile: Arc<dyn ProfileFetcher>,
    ) -> Self {
        let id = Uuid::new_v4();
        let label = label.into();
        let view = Arc::new(Mutex::new(LocalView {
            state: ObserverState::Bootstrapping,
            mounted: true,
        }));

        let subscription = {
            let view = view.clone();
            let label = label.clone();
            session.subscribe(move |notification| {
                let mut view = lock(&view);
                if !view.mounted {
                    return;
                }
                view.state.apply(notification);
                debug!(
                    observer = label.as_str(),
                    logged_in = notification.logged_in,
                    "observer applied session change"
                );
            })
        };
        debug!(observer = label.as_str(), observer_id = %id, "observer mounted");

        Self {
            id,
            label,
            session,
            profile,
            view,
            subscription: Mutex::new(Some(subscription)),
        }
    }

    /// `new` followed by `bootstrap`.
    pub async fn mount(
        label: impl Into<String>,
        session: Arc<SessionStore>,
        profile: Arc<dyn ProfileFetcher>,
    ) -> Self {
        let observer = Self::new(label, session, profile);
        observer.bootstrap().await;
        observer
    }

    /// Runs `bootstrap` on the tokio runtime so the caller can unmount
    /// while the profile fetch is still in flight.
    pub fn spawn_bootstrap(self: &Arc<Self>) -> JoinHandle<ObserverState> {
        let observer = self.clone();
        tokio::spawn(async move { observer.bootstrap().await })
    }

    /// Derives the initial view and returns it.
    ///
    /// A notification applied while this runs is newer than anything the
    /// bootstrap read, so it always wins.
    pub async fn bootstrap(&self) -> ObserverState {
        if !self.is_mounted() {
            return self.state();
        }
        let epoch = self.session.epoch();

        if let Some(user) = self.session.get_user() {
            debug!(observer = self.label.as_str(), "bootstrap: cached user");
            self.adopt(ObserverState::LoggedIn(user), epoch);
            return self.state();
        }

        let Some(token) = self.session.get_token() else {
            debug!(observer = self.label.as_str(), "bootstrap: no token");
            self.adopt(ObserverState::LoggedOut, epoch);
            return self.state();
        };

        debug!(observer = self.label.as_str(), "bootstrap: fetching profile");
        let result = self.profile.fetch_profile(&token).await;

        if !self.is_mounted() {
            debug!(
                observer = self.label.as_str(),
                "bootstrap: discarding profile result after unmount"
            );
            return self.state();
        }

        // Any set_auth/clear_auth since `epoch` makes this result stale.
        let applied = match &result {
            Ok(user) => self
                .session
                .set_auth_if_unchanged(epoch, Some(&token), Some(user)),
            Err(_) => self.session.clear_auth_if_unchanged(epoch),
        };
        if !applied {
            debug!(
                observer = self.label.as_str(),
                "bootstrap: session changed during fetch, discarding result"
            );
            return self.state();
        }

        match result {
            Ok(_) => info!(
                event_name = "session.bootstrap.validated",
                event_domain = "session",
                observer = self.label.as_str(),
                "token validated, profile cached"
            ),
            Err(e) => warn!(
                event_name = "session.bootstrap.rejected",
                event_domain = "session",
                observer = self.label.as_str(),
                "cached token rejected, logged out: {}",
                e
            ),
        }
        // Our own notification has set the view by now.
        self.state()
    }

    /// This fragment's own logout action.
    pub fn logout(&self) {
        self.session.clear_auth();
    }

    /// Stops following the session. Later notifications and fetch results are ignored.
    pub fn unmount(&self) {
        lock(&self.view).mounted = false;
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
            debug!(observer = self.label.as_str(), "observer unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        lock(&self.view).mounted
    }

    pub fn state(&self) -> ObserverState {
        lock(&self.view).state.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state().user().cloned()
    }

    pub fn is_logged_in(&self) -> bool {
        matches!(lock(&self.view).state, ObserverState::LoggedIn(_))
    }

    pub fn display_name(&self) -> Option<String> {
        self.user().map(|u| u.display_name().to_string())
    }

    pub fn avatar_url(&self) -> Option<String> {
        self.user().and_then(|u| u.profile_pic)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn adopt(&self, state: ObserverState, epoch: u64) {
        let mut view = lock(&self.view);
        if view.mounted
            && view.state == ObserverState::Bootstrapping
            && self.session.epoch() == epoch
        {
            view.state = state;
        }
    }
}

impl Drop for SessionObserver {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for SessionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionObserver")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendError;
    use crate::config::SessionConfig;
    use crate::storage::{MemoryStorage, Storage};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use crate::storage::StorageError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{OnceLock, Weak};
    use tokio::sync::Notify;

    /// Answers every fetch with a fixed result and counts the calls.
    struct FakeProfile {
        result: Option<User>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeProfile {
        fn ok(user: User) -> Arc<Self> {
            Arc::new(Self {
                result: Some(user),
                calls: AtomicUsize::new(0),
                gate: None,
            })
        }

        fn rejecting() -> Arc<Self> {
            Arc::new(Self {
                result: None,
                calls: AtomicUsize::new(0),
                gate: None,
            })
        }

        fn gated(user: User, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                result: Some(user),
                calls: AtomicUsize::new(0),
                gate: Some(gate),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProfileFetcher for FakeProfile {
        async fn fetch_profile(&self, _token: &str) -> Result<User, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result.clone().ok_or(BackendError::Rejected {
                status: StatusCode::UNAUTHORIZED,
                message: None,
            })
        }
    }

    type Interleaved = Box<dyn Fn(&SessionStore) + Send + Sync>;

    /// Memory storage that runs a store mutation the first time `key` is read,
    /// after the read itself, as if another task raced the reader.
    struct InterleavingStorage {
        inner: MemoryStorage,
        key: &'static str,
        action: Mutex<Option<Interleaved>>,
        store: OnceLock<Weak<SessionStore>>,
    }

    impl Storage for InterleavingStorage {
        fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            let value = self.inner.get_item(key)?;
            if key == self.key {
                let action = self.action.lock().unwrap().take();
                let store = self.store.get().and_then(Weak::upgrade);
                if let (Some(action), Some(store)) = (action, store) {
                    action(&store);
                }
            }
            Ok(value)
        }
        fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set_item(key, value)
        }
        fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove_item(key)
        }
    }

    fn interleaved_session(
        key: &'static str,
        action: impl Fn(&SessionStore) + Send + Sync + 'static,
    ) -> Arc<SessionStore> {
        let storage = Arc::new(InterleavingStorage {
            inner: MemoryStorage::new(),
            key,
            action: Mutex::new(Some(Box::new(action))),
            store: OnceLock::new(),
        });
        let store = Arc::new(SessionStore::new(storage.clone(), SessionConfig::default()));
        let _ = storage.store.set(Arc::downgrade(&store));
        store
    }

    fn session() -> (Arc<MemoryStorage>, Arc<SessionStore>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(SessionStore::new(storage.clone(), SessionConfig::default()));
        (storage, store)
    }

    #[tokio::test]
    async fn test_cached_user_needs_no_fetch() {
        let (_storage, store) = session();
        store.set_auth(None, Some(&User::named("Ann")));
        let profile = FakeProfile::rejecting();

        let observer = SessionObserver::mount("header", store.clone(), profile.clone()).await;

        assert_eq!(observer.state(), ObserverState::LoggedIn(User::named("Ann")));
        assert_eq!(observer.display_name().as_deref(), Some("Ann"));
        assert_eq!(profile.calls(), 0);
    }

    #[tokio::test]
    async fn test_token_is_validated_and_cached() {
        let (_storage, store) = session();
        store.set_auth(Some("abc"), None);
        let profile = FakeProfile::ok(User::named("Bo"));

        let observer = SessionObserver::new("hero", store.clone(), profile.clone());
        assert_eq!(observer.state(), ObserverState::Bootstrapping);

        let state = observer.bootstrap().await;
        assert_eq!(state, ObserverState::LoggedIn(User::named("Bo")));
        assert_eq!(store.get_user(), Some(User::named("Bo")));
        assert_eq!(store.get_token().as_deref(), Some("abc"));
        assert_eq!(profile.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejected_token_is_cleared() {
        let (storage, store) = session();
        storage.set_item("authToken", "expired").unwrap();

        let observer =
            SessionObserver::mount("profile", store.clone(), FakeProfile::rejecting()).await;

        assert_eq!(observer.state(), ObserverState::LoggedOut);
        assert_eq!(store.get_token(), None);
    }

    #[tokio::test]
    async fn test_empty_store_is_logged_out_without_fetch() {
        let (_storage, store) = session();
        let profile = FakeProfile::ok(User::named("Bo"));

        let observer = SessionObserver::mount("header", store, profile.clone()).await;

        assert_eq!(observer.state(), ObserverState::LoggedOut);
        assert_eq!(observer.display_name(), None);
        assert_eq!(profile.calls(), 0);
    }

    #[tokio::test]
    async fn test_follows_login_and_logout() {
        let (_storage, store) = session();
        let observer =
            SessionObserver::mount("header", store.clone(), FakeProfile::rejecting()).await;

        let mut user = User::named("Cy");
        user.profile_pic = Some("https://cdn.example.com/cy.png".to_string());
        store.set_auth(Some("tok"), Some(&user));
        assert!(observer.is_logged_in());
        assert_eq!(
            observer.avatar_url().as_deref(),
            Some("https://cdn.example.com/cy.png")
        );

        observer.logout();
        assert_eq!(observer.state(), ObserverState::LoggedOut);
        assert_eq!(store.get_token(), None);
    }

    #[tokio::test]
    async fn test_unmounted_observer_ignores_changes() {
        let (_storage, store) = session();
        let observer =
            SessionObserver::mount("header", store.clone(), FakeProfile::rejecting()).await;

        observer.unmount();
        store.set_auth(Some("tok"), Some(&User::named("Ann")));

        assert_eq!(observer.state(), ObserverState::LoggedOut);
        assert!(!observer.is_mounted());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let (_storage, store) = session();
        let observer =
            SessionObserver::mount("header", store.clone(), FakeProfile::rejecting()).await;
        store.set_auth(None, Some(&User::named("Ann")));
        drop(observer);

        // Nothing left to deliver to.
        store.clear_auth();
        assert_eq!(store.get_user(), None);
    }

    #[tokio::test]
    async fn test_logout_during_fetch_discards_stale_profile() {
        let (_storage, store) = session();
        store.set_auth(Some("abc"), None);
        let gate = Arc::new(Notify::new());
        let profile = FakeProfile::gated(User::named("Bo"), gate.clone());

        let observer = Arc::new(SessionObserver::new("header", store.clone(), profile.clone()));
        let handle = observer.spawn_bootstrap();
        while profile.calls() == 0 {
            tokio::task::yield_now().await;
        }

        store.clear_auth();
        gate.notify_one();
        let state = handle.await.unwrap();

        assert_eq!(state, ObserverState::LoggedOut);
        assert_eq!(store.get_user(), None);
        assert_eq!(store.get_token(), None);
    }

    #[tokio::test]
    async fn test_unmount_during_fetch_discards_result() {
        let (_storage, store) = session();
        store.set_auth(Some("abc"), None);
        let gate = Arc::new(Notify::new());
        let profile = FakeProfile::gated(User::named("Bo"), gate.clone());

        let observer = Arc::new(SessionObserver::new("profile", store.clone(), profile.clone()));
        let handle = observer.spawn_bootstrap();
        while profile.calls() == 0 {
            tokio::task::yield_now().await;
        }

        observer.unmount();
        gate.notify_one();
        let state = handle.await.unwrap();

        assert_eq!(state, ObserverState::Bootstrapping);
        // The unmounted observer must not backfill the cache either.
        assert_eq!(store.get_user(), None);
    }

    #[tokio::test]
    async fn test_login_during_token_read_wins_over_logged_out() {
        let store = interleaved_session("authToken", |store| {
            store.set_auth(Some("t"), Some(&User::named("Zed")));
        });
        let profile = FakeProfile::rejecting();

        let observer = SessionObserver::mount("header", store.clone(), profile.clone()).await;

        assert_eq!(store.get_user(), Some(User::named("Zed")));
        assert_eq!(observer.state(), ObserverState::LoggedIn(User::named("Zed")));
        assert_eq!(profile.calls(), 0);
    }

    #[tokio::test]
    async fn test_logout_during_user_read_wins_over_cached_user() {
        let store = interleaved_session("authUser", |store| store.clear_auth());
        store.set_auth(Some("abc"), Some(&User::named("Ann")));

        let observer =
            SessionObserver::mount("header", store.clone(), FakeProfile::rejecting()).await;

        assert_eq!(store.get_user(), None);
        assert_eq!(observer.state(), ObserverState::LoggedOut);
    }

    #[tokio::test]
    async fn test_late_rejection_does_not_clear_newer_login() {
        let (_storage, store) = session();
        store.set_auth(Some("expired"), None);
        let gate = Arc::new(Notify::new());
        let profile = Arc::new(FakeProfile {
            result: None,
            calls: AtomicUsize::new(0),
            gate: Some(gate.clone()),
        });

        let observer = Arc::new(SessionObserver::new("hero", store.clone(), profile.clone()));
        let handle = observer.spawn_bootstrap();
        while profile.calls() == 0 {
            tokio::task::yield_now().await;
        }

        store.set_auth(Some("fresh"), Some(&User::named("Bo")));
        gate.notify_one();
        let state = handle.await.unwrap();

        assert_eq!(state, ObserverState::LoggedIn(User::named("Bo")));
        assert_eq!(store.get_token().as_deref(), Some("fresh"));
    }
}
