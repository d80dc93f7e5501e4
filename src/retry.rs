//! Exponential backoff shared by the HTTP envelope and the transfer engines.

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Delay before retry number `retry_count` (0 = first retry): `base * 2^retry_count`.
pub fn retry_delay(retry_count: u32, base: Duration) -> Duration {
    let multiplier = 2_u32.saturating_pow(retry_count);
    base.saturating_mul(multiplier)
}

/// Run `op` until it succeeds, fails with a non-transient error, or
/// `retries` extra attempts have been spent.
pub async fn with_retries<T, F, Fut>(
    what: &str,
    retries: u32,
    backoff: Duration,
    op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retries_until(what, retries, backoff, std::future::pending(), op).await
}

/// [`with_retries`] that gives up with [`Error::TransferStopped`] once
/// `stop` resolves. An attempt in flight is never interrupted; a backoff
/// sleep is.
pub async fn with_retries_until<T, F, Fut, S>(
    what: &str,
    retries: u32,
    backoff: Duration,
    stop: S,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    S: Future<Output = ()>,
{
    tokio::pin!(stop);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < retries && e.is_transient() => {
                let delay = retry_delay(attempt, backoff);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what,
                    attempt + 1,
                    retries + 1,
                    e,
                    delay
                );
                tokio::select! {
                    _ = &mut stop => {
                        tracing::debug!("{} abandoned, stop requested", what);
                        return Err(Error::TransferStopped);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
