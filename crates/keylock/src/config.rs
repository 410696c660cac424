//! Lock manager configuration
//!
//! Loaded from an optional file followed by `KEYLOCK_`-prefixed environment
//! variables, e.g. `KEYLOCK_TTL_MS=5000`, `KEYLOCK_BACKEND=remote`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "KEYLOCK";
pub const DEFAULT_TTL_MS: u64 = 30000;

/// Where lock state lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Process memory; lockers exclude each other only inside one process
    #[default]
    Local,
    /// Shared atomic store; lockers exclude each other across processes
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockManagerConfig {
    /// Time-to-live applied to every locker, in milliseconds
    pub ttl_ms: u64,
    pub backend: BackendKind,
    /// Prepended to every lock name to form the store key
    pub key_prefix: String,
    /// Fixed owner token for remote lockers (fresh token per acquire when unset)
    pub owner_token: Option<String>,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            backend: BackendKind::Local,
            key_prefix: String::new(),
            owner_token: None,
        }
    }
}

impl LockManagerConfig {
    /// TTL is kept in whole milliseconds; `validate` rejects anything below 1 ms
    pub fn new(ttl: Duration, backend: BackendKind) -> Self {
        Self {
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            backend,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_ms == 0 {
            return Err(ConfigError::InvalidTtl);
        }
        Ok(())
    }

    /// Load from `path` (format inferred from the extension) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(
            path,
            Environment::with_prefix(ENV_PREFIX).try_parsing(true),
        )
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder.add_source(env).build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    pub fn with_owner_token(mut self, token: &str) -> Self {
        self.owner_token = Some(token.to_string());
        self
    }
}
