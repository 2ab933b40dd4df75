//! Rate-limited HTTP GET
//!
//! Each call is exactly one request. Retry budgets belong to the reconciler.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::{clock::DefaultClock, state::InMemoryState, Jitter, Quota, RateLimiter};
use reqwest::Client;
use url::Url;

use crate::errors::{ConfigError, ConfigResult, DownloadError, DownloadResult};

type DirectRateLimiter = RateLimiter<governor::state::NotKeyed, InMemoryState, DefaultClock>;

/// HTTP operations handler with rate limiting
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    rate_limiter: DirectRateLimiter,
}

impl HttpHandler {
    /// Creates a new HttpHandler with the given client and rate limiting
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `rate_limit_rps` is zero
    pub fn new(client: Client, rate_limit_rps: u32) -> ConfigResult<Self> {
        let rate_limiter = Self::build_rate_limiter(rate_limit_rps)?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    fn build_rate_limiter(rate_limit_rps: u32) -> ConfigResult<DirectRateLimiter> {
        let rps = NonZeroU32::new(rate_limit_rps).ok_or_else(|| ConfigError::InvalidValue {
            field: "client.rate_limit_rps".to_string(),
            value: rate_limit_rps.to_string(),
            reason: "Rate limit must be non-zero".to_string(),
        })?;
        Ok(RateLimiter::direct(Quota::per_second(rps)))
    }

    /// Send one GET request and require a success status
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Network` on transport failure or a non-2xx status
    pub async fn get_response(&self, url: &Url) -> DownloadResult<reqwest::Response> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| DownloadError::network(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::network(
                url.as_str(),
                format!("server responded with HTTP {}", status.as_u16()),
            ));
        }

        tracing::debug!("Fetched response headers: {}", url);
        Ok(response)
    }
}
