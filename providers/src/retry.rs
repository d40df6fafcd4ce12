//! HTTP retry policy with exponential backoff.
//!
//! # Retry Policy
//!
//! - Max retries: 2 (3 total attempts)
//! - Initial delay: 500ms, doubling per retry
//! - Max delay: 8 seconds
//! - Jitter: down-jitter up to 25% (multiplier in [0.75, 1.0])
//! - `Retry-After` (seconds, 0 < n < 60) overrides the computed delay
//!
//! # Retryable Conditions
//!
//! - HTTP 408, 429, 5xx
//! - Connection errors and timeouts

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response};

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting initial request).
    pub max_retries: u32,
    /// Initial backoff delay before first retry.
    pub initial_delay: Duration,
    /// Maximum backoff delay.
    pub max_delay: Duration,
    /// Jitter factor for down-jitter (0.25 = up to 25% reduction).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500..=599)
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// Parse a `Retry-After` header given in whole seconds.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers
        .get("retry-after")?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    let delay = Duration::from_secs(secs);
    (delay > Duration::ZERO && delay < Duration::from_secs(60)).then_some(delay)
}

/// Delay before retry number `backoff_step + 1`.
#[must_use]
pub fn backoff_delay(backoff_step: u32, config: &RetryConfig, headers: Option<&HeaderMap>) -> Duration {
    if let Some(delay) = headers.and_then(parse_retry_after) {
        return delay;
    }

    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step as i32);
    let capped = base.min(config.max_delay.as_secs_f64());
    let jitter = 1.0 - rand::random::<f64>() * config.jitter_factor;
    Duration::from_secs_f64(capped * jitter)
}

/// Final result of [`send_with_retry`].
#[derive(Debug)]
pub enum RetryOutcome {
    /// 2xx response.
    Success(Response),
    /// Non-2xx response, either non-retryable or after exhausting retries.
    HttpError(Response),
    /// Transport failure, after `attempts` tries.
    ConnectionError { attempts: u32, source: reqwest::Error },
}

/// Send a request, retrying retryable failures per `config`.
///
/// `build_request` is called once per attempt.
pub async fn send_with_retry<F>(build_request: F, config: &RetryConfig) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let can_retry = attempt < config.max_retries;
        match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return RetryOutcome::Success(response);
                }
                if !can_retry || !is_retryable_status(status.as_u16()) {
                    return RetryOutcome::HttpError(response);
                }
                let delay = backoff_delay(attempt, config, Some(response.headers()));
                tracing::warn!(
                    status = %status,
                    retry = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying generator request after error status"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if !can_retry || !is_retryable_error(&e) {
                    return RetryOutcome::ConnectionError {
                        attempts: attempt + 1,
                        source: e,
                    };
                }
                let delay = backoff_delay(attempt, config, None);
                tracing::warn!(
                    error = %e,
                    retry = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying generator request after connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }
        attempt += 1;
    }
}
