//! HTTP retry wrapper for gateway hiccups and rate limiting.
//!
//! `send_with_retry()` stands in for `request.send()` and adds:
//! - Exponential backoff with jitter on 429, 502, 503 and 504
//! - Retry-After header support (seconds form)
//! - Passthrough for everything else, including 500: an application error
//!   from the hora endpoint is left to the scheduler's normal cadence

use reqwest::{Client, Request, Response};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpRetryConfig {
    /// Maximum number of retry attempts (default: 2)
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff (default: 1000)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 8000)
    pub max_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl HttpRetryConfig {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 502 | 503 | 504)
}

/// Parse Retry-After header value (seconds only; capped at the backoff ceiling)
fn parse_retry_after(response: &Response, config: &HttpRetryConfig) -> Option<Duration> {
    let value = response.headers().get("retry-after")?.to_str().ok()?;
    let secs = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs).min(Duration::from_millis(config.max_delay_ms)))
}

fn calculate_delay(attempt: u32, config: &HttpRetryConfig) -> Duration {
    let base = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_delay_ms as f64);
    // 10-30% jitter
    let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((capped + jitter) as u64)
}

/// Send an HTTP request, retrying on 429/502/503/504.
///
/// The request is rebuilt from its parts for each retry, so bodies must be
/// in-memory (JSON bodies are).
pub async fn send_with_retry(
    client: &Client,
    request: Request,
    config: &HttpRetryConfig,
) -> Result<Response, reqwest::Error> {
    let method = request.method().clone();
    let url = request.url().clone();
    let headers = request.headers().clone();
    let body_bytes = request.body().and_then(|b| b.as_bytes()).map(|b| b.to_vec());

    let mut last_response = client.execute(request).await?;

    for attempt in 0..config.max_retries {
        if !is_retryable_status(last_response.status().as_u16()) {
            return Ok(last_response);
        }

        let delay = parse_retry_after(&last_response, config)
            .unwrap_or_else(|| calculate_delay(attempt, config));

        tracing::debug!(
            "HTTP {} {} returned {}. Retry {}/{} after {:?}",
            method,
            url,
            last_response.status(),
            attempt + 1,
            config.max_retries,
            delay
        );

        tokio::time::sleep(delay).await;

        let mut retry_req = client.request(method.clone(), url.clone());
        for (key, value) in headers.iter() {
            retry_req = retry_req.header(key, value);
        }
        if let Some(ref body) = body_bytes {
            retry_req = retry_req.body(body.clone());
        }

        last_response = retry_req.send().await?;
    }

    Ok(last_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_status() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(502));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(504));
        assert!(!is_retryable_status(500));
        assert!(!is_retryable_status(200));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(403));
    }

    #[test]
    fn test_calculate_delay_bounded() {
        let config = HttpRetryConfig::default();
        for attempt in 0..10 {
            let delay = calculate_delay(attempt, &config);
            // cap plus at most 30% jitter
            assert!(delay.as_millis() <= (config.max_delay_ms as u128 * 13 / 10));
        }
    }

    #[test]
    fn test_none_disables_retries() {
        assert_eq!(HttpRetryConfig::none().max_retries, 0);
    }
}
