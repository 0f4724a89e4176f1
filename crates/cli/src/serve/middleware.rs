//! HTTP middleware: rate limiting and API key authentication, plus the
//! identity-header resolver handlers call per request.

use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use careflow_service::{RequestContext, Role};

use super::state::AppState;

/// Rate limiting middleware. Checks per-IP request rate before routing.
pub(crate) async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let ip = addr.ip();
    match state.rate_limiter.check(ip).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            let body = serde_json::json!({
                "error": {
                    "code": "rate_limited",
                    "message": "rate limit exceeded",
                    "retry_after": retry_after,
                }
            });
            (StatusCode::TOO_MANY_REQUESTS, axum::Json(body)).into_response()
        }
    }
}

/// API key authentication middleware.
///
/// If `CAREFLOW_API_KEY` is set, all requests (except /health) must
/// include either `Authorization: Bearer <key>` or `X-API-Key: <key>`.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let expected_key = match &state.api_key {
        Some(k) => k,
        None => return next.run(request).await, // No auth configured
    };

    // /health is exempt from auth (for load balancer health checks)
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    if let Some(auth) = auth_header {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            if token == expected_key {
                return next.run(request).await;
            }
            return super::json_error(StatusCode::FORBIDDEN, "forbidden", "invalid API key")
                .into_response();
        }
    }

    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok());

    if let Some(key) = api_key_header {
        if key == expected_key {
            return next.run(request).await;
        }
        return super::json_error(StatusCode::FORBIDDEN, "forbidden", "invalid API key")
            .into_response();
    }

    super::json_error(
        StatusCode::UNAUTHORIZED,
        "unauthorized",
        "authentication required",
    )
    .into_response()
}

/// Resolve the caller's identity from the request headers.
///
/// This is the identity/tenant collaborator seam: in production a gateway
/// resolves the session and stamps these headers; the service trusts them.
/// `X-Careflow-Tenant` and `X-Careflow-User` are required;
/// `X-Careflow-Role` defaults to `front_desk`.
pub(crate) fn require_identity(headers: &HeaderMap) -> Result<RequestContext, Response> {
    let tenant = headers
        .get("x-careflow-tenant")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    let user = headers
        .get("x-careflow-user")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());

    let (Some(tenant), Some(user)) = (tenant, user) else {
        return Err(super::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "X-Careflow-Tenant and X-Careflow-User headers are required",
        )
        .into_response());
    };

    let role = match headers
        .get("x-careflow-role")
        .and_then(|v| v.to_str().ok())
    {
        None => Role::FrontDesk,
        Some(raw) => match raw.parse::<Role>() {
            Ok(role) => role,
            Err(message) => {
                return Err(super::json_error(
                    StatusCode::BAD_REQUEST,
                    "validation_failed",
                    &message,
                )
                .into_response())
            }
        },
    };

    Ok(RequestContext::new(tenant, user, role))
}
