//! Keylock Redis - `AtomicStore` backed by Redis
//!
//! Both operations run as Lua scripts, so the existence/value check and the
//! write happen in one server-side step. Key expiry uses Redis `PX`.
//!
//! Deployment guarantees follow Redis: a single instance gives full mutual
//! exclusion; with Sentinel or Cluster a lock can be lost during failover.

mod store;

pub use store::RedisStore;

use std::sync::Arc;
use std::time::Duration;

use keylock::{LockManager, StoreError};

/// Connect to `url` and build a remote `LockManager` over it
pub async fn connect_lock_manager(url: &str, ttl: Duration) -> Result<LockManager, StoreError> {
    let store = RedisStore::connect(url).await?;
    Ok(LockManager::remote(Arc::new(store), ttl))
}
