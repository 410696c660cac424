//! Error types for lock operations
//!
//! - `LockError`: outcome of a single `acquire`/`release` attempt
//! - `StoreError`: infrastructure failure reported by an atomic store
//! - `ConfigError`: rejected manager configuration

/// Boxed error raised by a store backend (transport, server, script runtime)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by `Locker::acquire` and `Locker::release`
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock: not acquired")]
    NotAcquired,

    #[error("lock: lock not held")]
    LockNotHeld,

    #[error("lock: invalid lock value: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    /// Whether the error is a contention outcome the caller may retry
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::NotAcquired | LockError::LockNotHeld)
    }

    /// Whether the error came from the store rather than the lock protocol
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, LockError::Store(_))
    }
}

/// Error reported by an `AtomicStore` implementation
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store: deadline exceeded")]
    DeadlineExceeded,

    #[error("store: unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("store: {0}")]
    Backend(#[source] BoxError),
}

impl StoreError {
    /// Wrap any backend error
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        StoreError::Backend(err.into())
    }
}

/// Error raised while building a `LockManager`
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("remote backend requires a store handle")]
    MissingRemoteStore,

    #[error("ttl must be greater than zero")]
    InvalidTtl,

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, LockError>;
