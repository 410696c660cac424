// Lock operation counters
// Emitted through the `metrics` facade; installing an exporter is up to the application

use metrics::{counter, describe_counter};

use crate::error::LockError;

pub(crate) const BACKEND_LOCAL: &str = "local";
pub(crate) const BACKEND_REMOTE: &str = "remote";

/// Register metric descriptions
/// Call once at startup, after the recorder is installed
pub fn describe_metrics() {
    describe_counter!(
        "keylock_acquire_total",
        "Total number of lock acquire attempts by outcome"
    );
    describe_counter!(
        "keylock_release_total",
        "Total number of lock release attempts by outcome"
    );
}

fn outcome(result: &Result<(), LockError>, success: &'static str) -> &'static str {
    match result {
        Ok(()) => success,
        Err(LockError::NotAcquired) => "not_acquired",
        Err(LockError::LockNotHeld) => "not_held",
        Err(LockError::InvalidState(_)) => "invalid_state",
        Err(LockError::Store(_)) => "store_error",
    }
}

/// Record an acquire attempt
pub(crate) fn record_acquire(backend: &'static str, result: &Result<(), LockError>) {
    counter!("keylock_acquire_total", "backend" => backend, "outcome" => outcome(result, "acquired"))
        .increment(1);
}

/// Record a release attempt
pub(crate) fn record_release(backend: &'static str, result: &Result<(), LockError>) {
    counter!("keylock_release_total", "backend" => backend, "outcome" => outcome(result, "released"))
        .increment(1);
}
