use std::path::Path;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::storage::StorageConfig;

/// Prefix for environment overrides, e.g. `AUTHSYNC_BACKEND__BASE_URL`.
pub const ENV_PREFIX: &str = "AUTHSYNC_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: backend endpoint, persistence medium, session keys and logging.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    fn into_latest(self) -> ConfigV1 {
        match self {
            Config::ConfigV1(c) => c,
        }
        // handle configuration migration between versions here when necessary
    }
}

/// Load config from a YAML file, with `AUTHSYNC_`-prefixed environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigV1, figment::Error> {
    let figment = Figment::new()
        .merge(Yaml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));
    figment.extract::<Config>().map(Config::into_latest)
}

/// Parse config from an in-memory YAML document.
pub fn parse_config(yaml: &str) -> Result<ConfigV1, figment::Error> {
    Figment::new()
        .merge(Yaml::string(yaml))
        .extract::<Config>()
        .map(Config::into_latest)
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() -> Result<(), serde_json::Error> {
    let schema = schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Where the account backend lives and how long we wait for it.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_in_ms")]
    pub timeout_in_ms: u64,
}

fn default_timeout_in_ms() -> u64 {
    5000
}

/// The two fixed keys the session lives under in the persistence medium.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct SessionConfig {
    #[serde(default = "default_token_key")]
    pub token_key: String,
    #[serde(default = "default_user_key")]
    pub user_key: String,
}

fn default_token_key() -> String {
    "authToken".to_string()
}

fn default_user_key() -> String {
    "authUser".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_key: default_token_key(),
            user_key: default_user_key(),
        }
    }
}
