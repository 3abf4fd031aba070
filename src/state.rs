//! Shared session context.
//!
//! Everything a session-aware fragment needs is handed to it explicitly
//! through this struct, never looked up globally.

use std::sync::Arc;

use crate::backend::{BackendClient, ProfileFetcher};
use crate::config::ConfigV1;
use crate::flows::AuthFlows;
use crate::session::{SessionObserver, SessionStore};

#[derive(Clone)]
pub struct AppState {
    /// Configuration loaded at startup.
    pub config: Arc<ConfigV1>,
    /// The one session store all observers and flows share.
    pub session: Arc<SessionStore>,
    /// Client for the account backend.
    pub backend: Arc<BackendClient>,
}

impl AppState {
    pub fn flows(&self) -> AuthFlows {
        AuthFlows::new(self.session.clone(), self.backend.clone())
    }

    /// A new observer, not yet bootstrapped.
    pub fn observer(&self, label: &str) -> SessionObserver {
        SessionObserver::new(
            label,
            self.session.clone(),
            self.backend.clone() as Arc<dyn ProfileFetcher>,
        )
    }

    /// A new observer that has already run its bootstrap.
    pub async fn mount_observer(&self, label: &str) -> SessionObserver {
        let observer = self.observer(label);
        observer.bootstrap().await;
        observer
    }
}
