//! Authentication-boundary helpers.

mod rate_limit;
mod ttl_cache;

pub use rate_limit::{AttemptRecord, LoginRateLimitPolicy, LoginRateLimiter, RateLimitDecision};
pub use ttl_cache::TtlCache;
