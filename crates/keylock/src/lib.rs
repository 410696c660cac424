//! Keylock - named mutual-exclusion locks with a TTL
//!
//! This crate provides:
//! - `LocalLocker`: in-process lock over a plain key-value mapping
//! - `RemoteLocker`: cross-process lock over an `AtomicStore`
//! - `LockManager`: factory binding lockers to one TTL and one backend
//!
//! A lock whose holder disappears becomes available again once its TTL
//! lapses. Local expiry is checked lazily on the next acquire; remote expiry
//! is the store's own key expiration.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use keylock::{Context, LockManager, LockError};
//!
//! let manager = LockManager::local(Duration::from_secs(30));
//! let locker = manager.new_locker("orders");
//! match locker.acquire(&Context::background()).await {
//!     Ok(()) => { /* critical section */ locker.release(&Context::background()).await?; }
//!     Err(LockError::NotAcquired) => { /* held elsewhere, retry later */ }
//!     Err(e) => return Err(e.into()),
//! }
//! ```

pub mod atomic;
pub mod config;
pub mod context;
pub mod error;
pub mod local;
pub mod locker;
pub mod manager;
pub mod metrics;
pub mod remote;
pub mod storage;

pub use atomic::{AtomicStore, MemoryAtomicStore};
pub use crate::config::{BackendKind, LockManagerConfig};
pub use context::Context;
pub use error::{ConfigError, LockError, Result, StoreError};
pub use local::{LocalLocker, LockRecord, SharedStorage};
pub use locker::Locker;
pub use manager::LockManager;
pub use remote::RemoteLocker;
pub use storage::{MemoryStorage, Storage};
