//! API Middleware
//!
//! Authentication and request logging middleware.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::domain::{RoleType, UserStatus};

use super::AppState;

/// Authenticated request identity, attached as a request extension by
/// `auth_middleware`. Absent when the request carried no usable token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: RoleType,
}

/// Paths that never require authentication (exact match, no prefixes)
const PUBLIC_PATHS: &[&str] = &["/auth/register", "/auth/login", "/health"];

// =========================================================================
// Token Authentication Middleware
// =========================================================================

/// Establish the request identity from an `Authorization: Bearer` token.
///
/// This middleware never rejects a request. A missing, malformed, expired,
/// or otherwise unusable token simply leaves no identity attached; the
/// route handlers decide whether that is acceptable. Only ACTIVE users
/// receive an identity, and the role always comes from the database row,
/// never from the token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if PUBLIC_PATHS.contains(&path) {
        return next.run(request).await;
    }

    if request.extensions().get::<CurrentUser>().is_some() {
        return next.run(request).await;
    }

    let Some(token) = bearer_token(&headers) else {
        return next.run(request).await;
    };

    let email = match state.tokens.subject_of(token) {
        Ok(email) => email,
        Err(e) => {
            tracing::debug!("Unparseable bearer token: {}", e);
            return next.run(request).await;
        }
    };

    let row: Option<(Uuid, String, String, String)> = match sqlx::query_as(
        "SELECT id, email, role, status FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(&state.pool)
    .await
    {
        Ok(row) => row,
        Err(e) => {
            // Continue unauthenticated; downstream checks will deny.
            tracing::error!("Database error during token authentication: {}", e);
            return next.run(request).await;
        }
    };

    let Some((id, email, role, status)) = row else {
        tracing::debug!("Token subject has no user row");
        return next.run(request).await;
    };

    let (Ok(role), Ok(status)) = (role.parse::<RoleType>(), status.parse::<UserStatus>()) else {
        tracing::error!(user_id = %id, "User row has an unrecognized role or status");
        return next.run(request).await;
    };

    if status != UserStatus::Active {
        tracing::debug!(user_id = %id, "Token subject is deactivated");
        return next.run(request).await;
    }

    if !state.tokens.is_valid(token, &email) {
        tracing::debug!(user_id = %id, "Token failed validation");
        return next.run(request).await;
    }

    request.extensions_mut().insert(CurrentUser { id, email, role });

    next.run(request).await
}

/// Extract the token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

// =========================================================================
// mask_headers_for_logging
// =========================================================================

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    // Mask sensitive headers
    let headers = mask_headers_for_logging(request.headers());

    let start = std::time::Instant::now();

    // Log request
    tracing::info!(
        method = %method,
        uri = %uri,
        version = ?version,
        headers = ?headers,
        "Incoming request"
    );

    // Process request
    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    // Log response
    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}
