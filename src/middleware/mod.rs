//! Request/response middleware
//!
//! Inbound state-changing requests pass the rate limiter before reaching a
//! handler; every response is decorated with the security headers on the
//! way out.

pub mod rate_limit;
pub mod security;

pub use rate_limit::{client_key, rate_limit_middleware, RateLimiter};
pub use security::{security_headers_middleware, SecurityHeaders};
