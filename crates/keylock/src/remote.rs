//! Locker over a shared `AtomicStore`
//!
//! All lock state lives in the store. Exclusivity comes from the store's
//! set-if-absent, expiry from its native key TTL, and ownership from the
//! token compared by delete-if-equals.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::atomic::AtomicStore;
use crate::context::Context;
use crate::error::{LockError, Result};
use crate::locker::{Locker, new_owner_token};
use crate::metrics::{self, BACKEND_REMOTE};

#[derive(Default)]
struct Tokens {
    /// Token of the acquisition this locker currently holds
    held: Option<String>,
    /// Tokens whose acquire ended without a reply (store error, deadline,
    /// dropped future); the store may have written any of them
    unconfirmed: Vec<String>,
}

/// Locker whose state lives in a store shared between processes
///
/// The lock belongs to this instance: another `RemoteLocker` for the same
/// key cannot release it, unless both were built with the same
/// `with_owner_token`.
pub struct RemoteLocker {
    store: Arc<dyn AtomicStore>,
    name: String,
    ttl: Duration,
    /// Token used for every acquisition instead of a fresh one
    fixed_token: Option<String>,
    tokens: Mutex<Tokens>,
}

impl RemoteLocker {
    pub fn new(store: Arc<dyn AtomicStore>, name: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            name: name.into(),
            ttl,
            fixed_token: None,
            tokens: Mutex::new(Tokens::default()),
        }
    }

    /// Use `token` for every acquisition.
    ///
    /// Any locker configured with the same token can release the lock,
    /// including one in another process.
    pub fn with_owner_token(mut self, token: impl Into<String>) -> Self {
        self.fixed_token = Some(token.into());
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn try_acquire(&self, ctx: &Context) -> Result<()> {
        let token = match &self.fixed_token {
            Some(token) => token.clone(),
            None => {
                let token = new_owner_token();
                // Stays unconfirmed if this future is dropped mid-call
                self.tokens.lock().unconfirmed.push(token.clone());
                token
            }
        };

        match self
            .store
            .set_if_absent(ctx, &self.name, &token, self.ttl)
            .await
        {
            Ok(true) => {
                self.confirm(token);
                Ok(())
            }
            Ok(false) => {
                self.discard(&token);
                Err(LockError::NotAcquired)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn try_release(&self, ctx: &Context) -> Result<()> {
        let candidates = match &self.fixed_token {
            Some(token) => vec![token.clone()],
            None => self.candidate_tokens(),
        };
        if candidates.is_empty() {
            return Err(LockError::LockNotHeld);
        }

        for token in candidates {
            let deleted = self.store.delete_if_equals(ctx, &self.name, &token).await?;
            self.discard(&token);
            if deleted {
                return Ok(());
            }
        }
        Err(LockError::LockNotHeld)
    }

    /// Held token first, then any unconfirmed ones
    fn candidate_tokens(&self) -> Vec<String> {
        let tokens = self.tokens.lock();
        tokens
            .held
            .iter()
            .chain(tokens.unconfirmed.iter())
            .cloned()
            .collect()
    }

    fn confirm(&self, token: String) {
        let mut tokens = self.tokens.lock();
        // The key was absent, so no earlier unconfirmed token can be live
        tokens.unconfirmed.clear();
        tokens.held = Some(token);
    }

    fn discard(&self, token: &str) {
        let mut tokens = self.tokens.lock();
        if tokens.held.as_deref() == Some(token) {
            tokens.held = None;
        }
        tokens.unconfirmed.retain(|t| t != token);
    }
}

#[async_trait]
impl Locker for RemoteLocker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn acquire(&self, ctx: &Context) -> Result<()> {
        let result = self.try_acquire(ctx).await;
        match &result {
            Ok(()) => debug!(key = %self.name, ttl = ?self.ttl, "Lock acquired"),
            Err(LockError::Store(e)) => warn!(key = %self.name, error = %e, "Lock acquire failed"),
            Err(_) => {}
        }
        metrics::record_acquire(BACKEND_REMOTE, &result);
        result
    }

    async fn release(&self, ctx: &Context) -> Result<()> {
        let result = self.try_release(ctx).await;
        match &result {
            Ok(()) => debug!(key = %self.name, "Lock released"),
            Err(LockError::Store(e)) => warn!(key = %self.name, error = %e, "Lock release failed"),
            Err(_) => {}
        }
        metrics::record_release(BACKEND_REMOTE, &result);
        result
    }
}
