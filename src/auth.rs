//! Shared-token gate for admin routes and admin WebSocket connections.
//!
//! This is a deployment convenience, not an account system: whoever knows
//! `ADMIN_TOKEN` may reassign, kick and clear.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, Response, StatusCode},
    middleware::Next,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Admin token (None = admin operations disabled)
    pub admin_token: Option<String>,
}

impl AuthConfig {
    /// Load auth config from the ADMIN_TOKEN environment variable
    pub fn from_env() -> Self {
        let admin_token = std::env::var("ADMIN_TOKEN")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if admin_token.is_some() {
            tracing::info!("Admin authentication enabled");
        } else {
            tracing::warn!("ADMIN_TOKEN not set - admin operations are DISABLED");
        }

        Self { admin_token }
    }

    pub fn disabled() -> Self {
        Self { admin_token: None }
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            admin_token: Some(token.into()),
        }
    }

    /// Check if admin access is possible at all
    pub fn is_enabled(&self) -> bool {
        self.admin_token.is_some()
    }

    /// Validate a presented token
    pub fn validate(&self, token: &str) -> bool {
        match &self.admin_token {
            // Use constant-time comparison to prevent timing attacks
            Some(expected) => constant_time_eq(expected.as_bytes(), token.as_bytes()),
            None => false,
        }
    }

    /// Token from `Authorization: Bearer ..` or a `token=` query parameter
    pub fn request_token(request: &Request<Body>) -> Option<String> {
        if let Some(value) = request.headers().get(header::AUTHORIZATION) {
            if let Ok(value) = value.to_str() {
                if let Some(token) = value.strip_prefix("Bearer ") {
                    return Some(token.trim().to_string());
                }
            }
        }
        query_param(request, "token")
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

/// Percent-decoded query parameter
fn query_param(request: &Request<Body>, key: &str) -> Option<String> {
    let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(request.uri()).ok()?;
    params.remove(key)
}

fn query_param_equals(request: &Request<Body>, key: &str, value: &str) -> bool {
    query_param(request, key).as_deref() == Some(value)
}

fn unauthorized(message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static("Bearer realm=\"chainq admin\""),
    );
    response
}

/// Middleware for the `/api/admin` routes
pub async fn admin_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if !auth_config.is_enabled() {
        tracing::warn!(uri = %request.uri(), "Admin request refused, ADMIN_TOKEN not configured");
        return unauthorized("Admin operations are disabled");
    }

    match AuthConfig::request_token(&request) {
        Some(token) if auth_config.validate(&token) => next.run(request).await,
        _ => {
            tracing::warn!(uri = %request.uri(), "Admin request with missing or invalid token");
            unauthorized("Unauthorized")
        }
    }
}

/// Middleware to require the admin token for `/ws?role=admin` connections.
///
/// Member connections pass through untouched.
pub async fn admin_ws_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if !query_param_equals(&request, "role", "admin") {
        return next.run(request).await;
    }

    match AuthConfig::request_token(&request) {
        Some(token) if auth_config.validate(&token) => next.run(request).await,
        _ => {
            tracing::warn!("Admin WebSocket refused");
            unauthorized("Unauthorized")
        }
    }
}
