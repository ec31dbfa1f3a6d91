//! Caller authentication and rate limiting.

pub mod rate_limit;
pub mod session_tokens;

pub use rate_limit::RateLimiter;
pub use session_tokens::{SessionTokens, StaticSessionToken};
