// Retry with exponential backoff

use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Run `operation` up to `max_attempts` times, doubling `base_delay` after each failure
/// (capped at 32x). Returns the last error once attempts are exhausted.
pub async fn with_retry<F, T, E>(
    what: &str,
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> futures::future::BoxFuture<'static, Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                attempt += 1;
                if attempt >= max_attempts {
                    return Err(error);
                }

                let delay = base_delay * 2u32.pow((attempt - 1).min(5));
                warn!(%error, attempt, ?delay, "{} failed, retrying", what);
                sleep(delay).await;
            }
        }
    }
}
