//! Security response headers
//!
//! Stateless decoration applied to every outgoing response, including
//! middleware short-circuits further out in the stack.

use crate::config::SecurityConfig;
use axum::{
    body::Body,
    extract::State,
    http::{header::HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Precomputed header set, built once from configuration
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    csp: HeaderValue,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityConfig) -> Self {
        let csp = HeaderValue::from_str(&config.content_security_policy())
            .unwrap_or_else(|_| HeaderValue::from_static("default-src 'self';"));
        SecurityHeaders { csp }
    }

    fn apply(&self, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
        headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
        headers.insert(
            "X-XSS-Protection",
            HeaderValue::from_static("1; mode=block"),
        );
        headers.insert(
            "Referrer-Policy",
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        );
        headers.insert("Content-Security-Policy", self.csp.clone());
    }
}

/// Middleware setting the security headers on every response
pub async fn security_headers_middleware(
    State(headers): State<SecurityHeaders>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    headers.apply(&mut response);
    response
}
