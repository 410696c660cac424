//! Atomic key-value store contract used by the remote locker
//!
//! Each operation must execute as one indivisible step on the store side.
//! A read followed by a separate write would reopen the race between
//! "is the lock free" and "claim the lock".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use crate::context::Context;
use crate::error::StoreError;

/// Store offering single-operation atomicity
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// Set `key` to `value` with expiration `ttl` only if `key` does not exist.
    ///
    /// Returns whether the value was written.
    async fn set_if_absent(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Delete `key` only if its current value equals `expected`.
    ///
    /// Returns whether a key was deleted.
    async fn delete_if_equals(
        &self,
        ctx: &Context,
        key: &str,
        expected: &str,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
impl<T: AtomicStore + ?Sized> AtomicStore for Arc<T> {
    async fn set_if_absent(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        (**self).set_if_absent(ctx, key, value, ttl).await
    }

    async fn delete_if_equals(
        &self,
        ctx: &Context,
        key: &str,
        expected: &str,
    ) -> Result<bool, StoreError> {
        (**self).delete_if_equals(ctx, key, expected).await
    }
}

/// Expiration used when `now + ttl` would overflow
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    expires_at: Instant,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-process `AtomicStore` with native per-key expiration.
///
/// Atomicity comes from the DashMap shard lock held by `entry`/`remove_if`.
/// Expired entries behave as absent and are dropped when next touched, or by
/// `purge_expired` for keys that are never used again.
#[derive(Debug, Default)]
pub struct MemoryAtomicStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryAtomicStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unexpired value of `key`
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Remaining time before `key` expires
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            purged += usize::from(expired);
            !expired
        });
        purged
    }
}

#[async_trait]
impl AtomicStore for MemoryAtomicStore {
    async fn set_if_absent(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if ctx.is_expired() {
            return Err(StoreError::DeadlineExceeded);
        }

        let now = Instant::now();
        let fresh = StoredEntry {
            value: value.to_string(),
            expires_at: now.checked_add(ttl).unwrap_or(now + MAX_TTL),
        };
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired(now) {
                    return Ok(false);
                }
                occupied.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn delete_if_equals(
        &self,
        ctx: &Context,
        key: &str,
        expected: &str,
    ) -> Result<bool, StoreError> {
        if ctx.is_expired() {
            return Err(StoreError::DeadlineExceeded);
        }

        let now = Instant::now();
        let removed = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired(now) && entry.value == expected);
        if removed.is_some() {
            return Ok(true);
        }

        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(false)
    }
}
