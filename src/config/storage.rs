use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A wrapper for the persistence medium configuration:
/// - enabled: if false, the medium is treated as not ready (NoStorage).
/// - backend: the actual storage backend (file, memory).
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct StorageConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub backend: Option<StorageBackend>,
}

/// The existing storage backends. We differentiate them via a "type" tag in the YAML.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
#[serde(tag = "type")]
pub enum StorageBackend {
    #[serde(rename = "file")]
    File(FileStorageConfig),
    #[serde(rename = "memory")]
    Memory,
}

#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct FileStorageConfig {
    /// JSON file holding the key/value pairs.
    pub path: PathBuf,
}
