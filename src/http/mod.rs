//! Control-plane HTTP envelope: URL composition, auth, retries, error
//! handlers and status mapping.

mod client;
pub mod handlers;
mod rate_limit;

pub use client::{AUTH_TOKEN_HEADER, Api, ApiBuilder, ApiResponse, RequestSpec, TOTAL_HEADER};
pub(crate) use client::error_for_response;
pub use handlers::{ErrorHandler, GeneralErrorSleeper, MaintenanceSleeper, RateLimitSleeper};
pub use rate_limit::{InstanceLimit, RateLimit, RateLimitStatus};
