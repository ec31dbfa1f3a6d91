//! Gateway module: the secured read-only path to the media server.
//!
//! - **[`upstream`]**: bounded, header-authenticated HTTP client for the
//!   media server.
//! - **[`policy`]**: which upstream sessions are shown and how many.
//! - **[`orchestrator`]**: the per-request pipeline tying settings, CSRF,
//!   rate limiting, upstream and normalization together.
//! - **[`response`]**: the JSON result object.
//!
//! ```text
//! HTTP request (server.rs)
//!   → Gateway::handle
//!       → ConfigStore::load
//!       → csrf::verify
//!       → RateLimiter::check_and_update
//!       → UpstreamClient::fetch_sessions
//!       → SessionFilterPolicy::apply
//!       → SessionNormalizer::normalize
//!   ← GatewayResponse
//! ```

pub mod orchestrator;
pub mod policy;
pub mod response;
pub mod upstream;

pub use orchestrator::{Gateway, GatewayRequest};
pub use response::GatewayResponse;
pub use upstream::UpstreamClient;
