//! Call-until-non-busy with exponential backoff.

use std::future::Future;
use std::time::Duration;

/// Builds the backoff ratchet: starting at `start/factor`, each
/// triggering response multiplies the delay by `factor`; past `max` the
/// ratchet gives up and the response is delivered as-is.
pub fn backoff<T>(
    start_ms: u64,
    max_ms: u64,
    factor: u64,
    trigger: impl Fn(&T) -> bool,
) -> impl FnMut(&T) -> Option<Duration> {
    let mut delay_ms = start_ms / factor;
    move |response| {
        if !trigger(response) {
            return None;
        }
        delay_ms *= factor;
        if delay_ms > max_ms {
            None
        } else {
            Some(Duration::from_millis(delay_ms))
        }
    }
}

/// Re-invokes `request` while `backoff` asks for another attempt,
/// sleeping the requested delay in between; otherwise hands the response
/// back.
pub async fn with_retry<T, F, Fut, B>(mut request: F, mut backoff: B) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    B: FnMut(&T) -> Option<Duration>,
{
    loop {
        let response = request().await;
        match backoff(&response) {
            Some(delay) => {
                tracing::debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
            }
            None => return response,
        }
    }
}
