//! Bounded waits on the per-area storage locks.

use crate::foundation::{SkusError, STORAGE_LOCK_TIMEOUT_SECS};
use parking_lot::{Mutex, MutexGuard};
use std::time::Duration;

pub fn acquire_with_timeout<'a, T>(lock: &'a Mutex<T>, operation: &'static str) -> Result<MutexGuard<'a, T>, SkusError> {
    acquire_with_timeout_for(lock, operation, Duration::from_secs(STORAGE_LOCK_TIMEOUT_SECS))
}

/// Waits up to `timeout` for `lock`. Sub-second timeouts report as one second.
pub fn acquire_with_timeout_for<'a, T>(
    lock: &'a Mutex<T>,
    operation: &'static str,
    timeout: Duration,
) -> Result<MutexGuard<'a, T>, SkusError> {
    lock.try_lock_for(timeout).ok_or_else(|| SkusError::StorageLockTimeout {
        operation: operation.to_string(),
        timeout_secs: timeout.as_secs().max(1),
    })
}
