use super::{Storage, StorageError};

/// A medium that is never ready, e.g. before the host environment has
/// provided one. Every call fails with `StorageError::Unavailable`.
pub struct NoStorage;

impl NoStorage {
    pub fn new() -> Self {
        NoStorage
    }
}

impl Default for NoStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for NoStorage {
    fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable)
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
