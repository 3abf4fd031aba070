use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::{file_storage::FileStorage, memory_storage::MemoryStorage, no_storage::NoStorage};
use crate::config::{StorageBackend, StorageConfig};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("persistence medium is not available")]
    Unavailable,
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage contents are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// The Storage trait abstracts the key/value persistence medium the session lives in.
///
/// Calls are synchronous, like browser-local storage.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    fn is_enabled(&self) -> bool {
        // Real media are always enabled; NoStorage returns false so logs can say why reads miss.
        true
    }
}

/// Creates a concrete storage implementation based on the StorageConfig.
/// If `storage.enabled = false`, returns NoStorage. Otherwise, picks the specified backend.
pub fn create_storage(config: &StorageConfig) -> Arc<dyn Storage> {
    if !config.enabled {
        info!("Session storage is disabled. Using NoStorage.");
        return Arc::new(NoStorage::new());
    }

    match &config.backend {
        Some(StorageBackend::File(file_config)) => {
            info!("Using file storage at {}", file_config.path.display());
            Arc::new(FileStorage::new(&file_config.path))
        }
        Some(StorageBackend::Memory) => {
            info!("Using in-memory session storage.");
            Arc::new(MemoryStorage::new())
        }
        None => {
            warn!("Storage is enabled, but no backend config is provided! Falling back to memory.");
            Arc::new(MemoryStorage::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileStorageConfig;

    #[test]
    fn test_disabled_config_yields_no_storage() {
        let storage = create_storage(&StorageConfig {
            enabled: false,
            backend: Some(StorageBackend::Memory),
        });
        assert!(!storage.is_enabled());
    }

    #[test]
    fn test_file_backend_is_selected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let storage = create_storage(&StorageConfig {
            enabled: true,
            backend: Some(StorageBackend::File(FileStorageConfig { path: path.clone() })),
        });
        storage.set_item("authToken", "abc").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_missing_backend_falls_back_to_memory() {
        let storage = create_storage(&StorageConfig {
            enabled: true,
            backend: None,
        });
        assert!(storage.is_enabled());
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
    }
}
