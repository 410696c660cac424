//! Per-call context forwarded from a locker to its store

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::StoreError;

/// Deadline carried through a lock operation.
///
/// Lockers never act on it themselves; store implementations bound their
/// round-trips with [`Context::run`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// Context without a deadline
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has already passed
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run a store future, failing with `DeadlineExceeded` once the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match self.deadline {
            Some(_) if self.is_expired() => Err(StoreError::DeadlineExceeded),
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| StoreError::DeadlineExceeded)?,
            None => fut.await,
        }
    }
}
