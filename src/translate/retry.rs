use anyhow::Result;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(1);
pub(crate) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(16);

pub(crate) fn is_rate_limited(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) fn next_delay(current: Duration) -> Duration {
    let next_secs = current
        .as_secs()
        .saturating_mul(2)
        .max(RATE_LIMIT_BASE_DELAY.as_secs());
    Duration::from_secs(next_secs).min(RATE_LIMIT_MAX_DELAY)
}

/// Sends the request built by `build`, retrying rate-limited responses up to
/// `max_retries` times. Returns the final status and body.
pub(crate) async fn send_with_retry<F>(
    service: &str,
    max_retries: usize,
    build: F,
) -> Result<(StatusCode, String)>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0usize;
    let mut delay = RATE_LIMIT_BASE_DELAY;
    loop {
        attempt += 1;
        let response = build().send().await?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        if is_rate_limited(status) && attempt <= max_retries {
            let mut wait = delay;
            if let Some(retry_after) = retry_after
                && retry_after > wait
            {
                wait = retry_after.min(RATE_LIMIT_MAX_DELAY);
            }
            warn!(
                "{} rate limited; retrying in {:.1}s (attempt {}/{})",
                service,
                wait.as_secs_f32(),
                attempt,
                max_retries
            );
            sleep(wait).await;
            delay = next_delay(delay);
            continue;
        }
        return Ok((status, body));
    }
}
