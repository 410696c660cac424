//! In-process locker over a `Storage` mapping
//!
//! The storage has no synchronisation of its own, so every acquire and
//! release runs its read-check-write sequence under the storage mutex.
//! The mutex is held for one call only, never for the lifetime of the lock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{LockError, Result};
use crate::locker::{Locker, new_owner_token};
use crate::metrics::{self, BACKEND_LOCAL};
use crate::storage::{MemoryStorage, Storage};

/// Value stored under a lock name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Acquisition timestamp (Unix millis)
    pub creation_time: i64,
    /// Token of the acquisition that wrote the record
    pub owner: String,
}

impl LockRecord {
    fn new(owner: String) -> Self {
        Self {
            creation_time: current_timestamp(),
            owner,
        }
    }

    fn decode(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| LockError::InvalidState(e.to_string()))
    }

    fn encode(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| LockError::InvalidState(e.to_string()))
    }

    /// Whether the record still blocks other acquisitions at `now`
    pub fn is_live(&self, ttl: Duration, now: i64) -> bool {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.creation_time.saturating_add(ttl_ms) > now
    }
}

/// Storage handle shared by several lockers
pub type SharedStorage<S = MemoryStorage> = Arc<Mutex<S>>;

/// Locker whose state lives in process memory
///
/// Lockers sharing one storage exclude each other on equal names. Lockers
/// over distinct storages never see each other's records.
pub struct LocalLocker<S: Storage = MemoryStorage> {
    name: String,
    ttl: Duration,
    storage: SharedStorage<S>,
    /// Token written by this locker's last successful acquire
    token: Mutex<Option<String>>,
}

impl LocalLocker<MemoryStorage> {
    /// Locker over its own empty `MemoryStorage`
    pub fn new(name: impl Into<String>, ttl: Duration) -> Self {
        Self::with_storage(MemoryStorage::new(), name, ttl)
    }
}

impl<S: Storage> LocalLocker<S> {
    pub fn with_storage(storage: S, name: impl Into<String>, ttl: Duration) -> Self {
        Self::with_shared_storage(Arc::new(Mutex::new(storage)), name, ttl)
    }

    pub fn with_shared_storage(
        storage: SharedStorage<S>,
        name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            ttl,
            storage,
            token: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // Lock order: storage, then token.
    fn try_acquire(&self) -> Result<()> {
        let mut storage = self.storage.lock();

        if let Some(value) = storage.get(&self.name) {
            let record = LockRecord::decode(value)?;
            if record.is_live(self.ttl, current_timestamp()) {
                return Err(LockError::NotAcquired);
            }
            debug!(key = %self.name, owner = %record.owner, "Reclaiming expired lock");
        }

        let token = new_owner_token();
        let record = LockRecord::new(token.clone());
        storage.set(&self.name, record.encode()?);
        *self.token.lock() = Some(token);
        Ok(())
    }

    fn try_release(&self) -> Result<()> {
        let mut storage = self.storage.lock();

        let record = match storage.get(&self.name) {
            Some(value) => LockRecord::decode(value)?,
            None => return Err(LockError::LockNotHeld),
        };
        let mut token = self.token.lock();
        if token.as_deref() != Some(record.owner.as_str()) {
            return Err(LockError::LockNotHeld);
        }

        storage.delete(&self.name);
        *token = None;
        Ok(())
    }
}

#[async_trait]
impl<S: Storage> Locker for LocalLocker<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self, _ctx: &Context) -> Result<()> {
        let result = self.try_acquire();
        match &result {
            Ok(()) => debug!(key = %self.name, "Lock acquired"),
            Err(LockError::InvalidState(reason)) => {
                warn!(key = %self.name, %reason, "Stored value is not a lock record")
            }
            Err(_) => {}
        }
        metrics::record_acquire(BACKEND_LOCAL, &result);
        result
    }

    async fn release(&self, _ctx: &Context) -> Result<()> {
        let result = self.try_release();
        match &result {
            Ok(()) => debug!(key = %self.name, "Lock released"),
            Err(LockError::InvalidState(reason)) => {
                warn!(key = %self.name, %reason, "Stored value is not a lock record")
            }
            Err(_) => {}
        }
        metrics::record_release(BACKEND_LOCAL, &result);
        result
    }
}

/// Drop records in `storage` whose TTL has lapsed, returning how many went
pub(crate) fn purge_expired_records(storage: &mut MemoryStorage, ttl: Duration) -> usize {
    let now = current_timestamp();
    let before = storage.len();
    storage.retain(|_, value| match LockRecord::decode(value) {
        Ok(record) => record.is_live(ttl, now),
        Err(_) => true,
    });
    before - storage.len()
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
