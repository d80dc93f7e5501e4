//! Error handlers run after transport retries for responses that are still
//! transient (429 or 5xx). Each may sleep and replay the request; the chain
//! stops at the first handler that returns a non-transient response.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::time::Duration;

use super::client::{Api, RequestSpec};
use super::rate_limit::RateLimit;
use crate::Result;

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Inspect a transient response and return either the same response or a
    /// replayed one.
    async fn handle(&self, api: &Api, request: &RequestSpec, response: Response)
    -> Result<Response>;
}

/// Sleeps until the rate-limit window resets, then replays the request.
#[derive(Debug, Clone)]
pub struct RateLimitSleeper {
    margin: Duration,
    max_attempts: u32,
}

impl Default for RateLimitSleeper {
    fn default() -> Self {
        Self {
            margin: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

impl RateLimitSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra time slept past the reset timestamp.
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

#[async_trait]
impl ErrorHandler for RateLimitSleeper {
    async fn handle(
        &self,
        api: &Api,
        request: &RequestSpec,
        mut response: Response,
    ) -> Result<Response> {
        let mut attempts = 0;
        while response.status() == StatusCode::TOO_MANY_REQUESTS && attempts < self.max_attempts {
            let wait = RateLimit::from_headers(response.headers())
                .and_then(|rate| rate.until_reset())
                .unwrap_or_default()
                + self.margin;
            tracing::warn!("rate limit reached, sleeping {:?} before retrying", wait);
            tokio::time::sleep(wait).await;
            response = api.execute(request).await?;
            attempts += 1;
        }
        Ok(response)
    }
}

/// Waits out a maintenance window (503).
#[derive(Debug, Clone)]
pub struct MaintenanceSleeper {
    sleep: Duration,
    max_attempts: u32,
}

impl Default for MaintenanceSleeper {
    fn default() -> Self {
        Self {
            sleep: Duration::from_secs(300),
            max_attempts: 12,
        }
    }
}

impl MaintenanceSleeper {
    pub fn new(sleep: Duration, max_attempts: u32) -> Self {
        Self {
            sleep,
            max_attempts,
        }
    }
}

#[async_trait]
impl ErrorHandler for MaintenanceSleeper {
    async fn handle(
        &self,
        api: &Api,
        request: &RequestSpec,
        mut response: Response,
    ) -> Result<Response> {
        let mut attempts = 0;
        while response.status() == StatusCode::SERVICE_UNAVAILABLE && attempts < self.max_attempts {
            tracing::warn!("service unavailable, sleeping {:?}", self.sleep);
            tokio::time::sleep(self.sleep).await;
            response = api.execute(request).await?;
            attempts += 1;
        }
        Ok(response)
    }
}

/// Fixed sleep and replay for any 5xx.
#[derive(Debug, Clone)]
pub struct GeneralErrorSleeper {
    sleep: Duration,
    max_attempts: u32,
}

impl Default for GeneralErrorSleeper {
    fn default() -> Self {
        Self {
            sleep: Duration::from_secs(300),
            max_attempts: 5,
        }
    }
}

impl GeneralErrorSleeper {
    pub fn new(sleep: Duration, max_attempts: u32) -> Self {
        Self {
            sleep,
            max_attempts,
        }
    }
}

#[async_trait]
impl ErrorHandler for GeneralErrorSleeper {
    async fn handle(
        &self,
        api: &Api,
        request: &RequestSpec,
        mut response: Response,
    ) -> Result<Response> {
        let mut attempts = 0;
        while response.status().is_server_error() && attempts < self.max_attempts {
            tracing::warn!(
                "server error {}, sleeping {:?}",
                response.status(),
                self.sleep
            );
            tokio::time::sleep(self.sleep).await;
            response = api.execute(request).await?;
            attempts += 1;
        }
        Ok(response)
    }
}
