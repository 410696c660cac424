//! The `Locker` capability shared by the local and remote backends

use async_trait::async_trait;

use crate::context::Context;
use crate::error::Result;

/// A named lock bound to one TTL and one backend.
///
/// Each call is a single attempt: contention comes back as
/// `LockError::NotAcquired` or `LockError::LockNotHeld` and retrying is left
/// to the caller.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Name of the locked resource
    fn name(&self) -> &str;

    /// Try to take the lock
    async fn acquire(&self, ctx: &Context) -> Result<()>;

    /// Give the lock back
    async fn release(&self, ctx: &Context) -> Result<()>;
}

/// Fresh owner token for one acquisition
pub(crate) fn new_owner_token() -> String {
    uuid::Uuid::new_v4().to_string()
}
