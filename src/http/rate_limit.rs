use reqwest::header::HeaderMap;
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const REQUEST_ID: &str = "x-request-id";

/// Rate-limit window as reported on the most recent response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    /// Unix timestamp (seconds) at which the window resets.
    pub reset: Option<u64>,
}

impl RateLimit {
    /// Extract rate-limit headers; `None` when the response carries none.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = header_u64(headers, RATE_LIMIT_LIMIT);
        let remaining = header_u64(headers, RATE_LIMIT_REMAINING);
        let reset = header_u64(headers, RATE_LIMIT_RESET);
        if limit.is_none() && remaining.is_none() && reset.is_none() {
            return None;
        }
        Some(Self {
            limit,
            remaining,
            reset,
        })
    }

    /// Time left until the reset timestamp, zero if it already passed.
    pub fn until_reset(&self) -> Option<Duration> {
        let reset = self.reset?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Some(Duration::from_secs(reset.saturating_sub(now)))
    }
}

/// Body of `GET /rate_limit`.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitStatus {
    pub rate: RateLimit,
    #[serde(default)]
    pub instance_limit: Option<InstanceLimit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstanceLimit {
    pub limit: i64,
    pub remaining: i64,
}

pub(crate) fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
