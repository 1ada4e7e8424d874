use crate::foundation::{SkusError, NON_RETRIABLE_ISSUER_STATUSES};
use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry an async operation with fixed delay/backoff.
pub async fn retry<F, Fut, T>(attempts: usize, delay: Duration, op: F) -> Result<T, SkusError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SkusError>>,
{
    retry_with_policy(attempts, delay, |_| true, op).await
}

/// Like [`retry`], but stops at the first error `is_retriable` rejects.
pub async fn retry_with_policy<F, Fut, T, P>(mut attempts: usize, delay: Duration, is_retriable: P, mut op: F) -> Result<T, SkusError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SkusError>>,
    P: Fn(&SkusError) -> bool,
{
    let mut last_err = None;
    while attempts > 0 {
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) => {
                if !is_retriable(&err) {
                    return Err(err);
                }
                debug!("retrying after error attempts_left={} error={}", attempts - 1, err);
                last_err = Some(err);
                attempts -= 1;
                if attempts > 0 {
                    sleep(delay).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| SkusError::Message("retry exhausted".to_string())))
}

/// Issuer failures with no status (transport) or a status outside the fixed non-retriable set.
pub fn is_retriable_issuer_error(err: &SkusError) -> bool {
    is_retriable_issuer_status(err, NON_RETRIABLE_ISSUER_STATUSES)
}

pub fn is_retriable_issuer_status(err: &SkusError, non_retriable: &[u16]) -> bool {
    match err {
        SkusError::IssuerRpc { status: Some(status), .. } => !non_retriable.contains(status),
        SkusError::IssuerRpc { status: None, .. } => true,
        _ => false,
    }
}
