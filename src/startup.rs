//! Wiring a session context from configuration.

use std::sync::Arc;

use tracing::info;

use crate::backend::{BackendClient, BackendError};
use crate::config::ConfigV1;
use crate::session::SessionStore;
use crate::state::AppState;
use crate::storage::create_storage;

/// Creates the persistence medium, the session store and the backend client.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn build_state(config: ConfigV1) -> Result<AppState, BackendError> {
    let config = Arc::new(config);
    let storage = create_storage(&config.storage);
    let session = Arc::new(SessionStore::new(storage, config.session.clone()));
    let backend = Arc::new(BackendClient::new(&config.backend)?);

    info!(
        "Session context ready (backend '{}', keys '{}'/'{}')",
        backend.base_url(),
        config.session.token_key,
        config.session.user_key
    );

    Ok(AppState {
        config,
        session,
        backend,
    })
}
