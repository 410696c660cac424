//! Factory handing out lockers bound to one TTL and one backend

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::atomic::AtomicStore;
use crate::config::{BackendKind, LockManagerConfig};
use crate::error::ConfigError;
use crate::local::{LocalLocker, SharedStorage, purge_expired_records};
use crate::locker::Locker;
use crate::remote::RemoteLocker;
use crate::storage::MemoryStorage;

/// Creates lockers for the configured backend.
///
/// Every call returns a new locker. Local lockers share the manager's
/// storage and remote lockers share the store, so lockers for the same name
/// exclude each other either way. A lock is owned by the locker instance that
/// acquired it: releasing through another instance of the same name gives
/// `LockNotHeld` unless a fixed owner token is configured for the remote
/// backend.
pub struct LockManager {
    ttl: Duration,
    backend: BackendKind,
    key_prefix: String,
    owner_token: Option<String>,
    store: Option<Arc<dyn AtomicStore>>,
    /// Records of currently held local locks; released records are removed
    local_storage: SharedStorage,
}

impl LockManager {
    /// Manager whose lockers live in process memory
    pub fn local(ttl: Duration) -> Self {
        Self {
            ttl,
            backend: BackendKind::Local,
            key_prefix: String::new(),
            owner_token: None,
            store: None,
            local_storage: Arc::new(Mutex::new(MemoryStorage::new())),
        }
    }

    /// Manager whose lockers coordinate through `store`
    pub fn remote(store: Arc<dyn AtomicStore>, ttl: Duration) -> Self {
        Self {
            backend: BackendKind::Remote,
            store: Some(store),
            ..Self::local(ttl)
        }
    }

    pub fn from_config(
        config: &LockManagerConfig,
        store: Option<Arc<dyn AtomicStore>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let manager = match (config.backend, store) {
            (BackendKind::Local, store) => Self {
                store,
                ..Self::local(config.ttl())
            },
            (BackendKind::Remote, Some(store)) => Self::remote(store, config.ttl()),
            (BackendKind::Remote, None) => return Err(ConfigError::MissingRemoteStore),
        };

        info!(
            backend = %config.backend,
            ttl_ms = config.ttl_ms,
            key_prefix = %config.key_prefix,
            "LockManager initialized"
        );

        Ok(Self {
            key_prefix: config.key_prefix.clone(),
            owner_token: config.owner_token.clone(),
            ..manager
        })
    }

    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        self.key_prefix = prefix.to_string();
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Locker for `name` on the configured backend
    pub fn new_locker(&self, name: &str) -> Arc<dyn Locker> {
        if let (BackendKind::Remote, Some(store)) = (self.backend, &self.store) {
            return Arc::new(self.remote_locker(store.clone(), name));
        }
        self.new_local_locker(name)
    }

    /// In-process locker for `name` over the manager's storage
    pub fn new_local_locker(&self, name: &str) -> Arc<LocalLocker> {
        Arc::new(LocalLocker::with_shared_storage(
            self.local_storage.clone(),
            self.key(name),
            self.ttl,
        ))
    }

    /// Number of local lock records currently stored, expired ones included
    pub fn local_records(&self) -> usize {
        self.local_storage.lock().len()
    }

    /// Drop local records whose holder let the TTL lapse without releasing.
    ///
    /// Expired records are otherwise only replaced when their name is
    /// acquired again.
    pub fn purge_expired(&self) -> usize {
        let purged = purge_expired_records(&mut self.local_storage.lock(), self.ttl);
        if purged > 0 {
            debug!(purged, "Purged expired local locks");
        }
        purged
    }

    /// Store-backed locker for `name`
    pub fn new_remote_locker(&self, name: &str) -> Result<RemoteLocker, ConfigError> {
        let store = self.store.clone().ok_or(ConfigError::MissingRemoteStore)?;
        Ok(self.remote_locker(store, name))
    }

    fn remote_locker(&self, store: Arc<dyn AtomicStore>, name: &str) -> RemoteLocker {
        let locker = RemoteLocker::new(store, self.key(name), self.ttl);
        match &self.owner_token {
            Some(token) => locker.with_owner_token(token.clone()),
            None => locker,
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }
}
