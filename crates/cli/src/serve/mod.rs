//! `careflow serve` -- HTTP JSON API for the queue service.
//!
//! Exposes the queue service operations as an async HTTP service using
//! `axum` + `tokio`, backed by the in-memory store. Supports concurrent
//! request handling; every mutation goes through the service's optimistic
//! retry path.
//!
//! Security features:
//! - Identity headers on every request (the identity collaborator seam):
//!   `X-Careflow-Tenant`, `X-Careflow-User`, optional `X-Careflow-Role`
//! - CORS headers on all responses (permissive for local dev)
//! - Per-IP rate limiting (default: 120 req/min, `CAREFLOW_RATE_LIMIT`)
//! - Optional API key authentication via `CAREFLOW_API_KEY`
//!
//! Endpoints:
//! - GET    /health                                     - server status (exempt from auth)
//! - POST   /patients                                   - register a patient id in the tenant
//! - POST   /clinicians                                 - register a clinician id in the tenant
//! - POST   /appointments                               - seed an appointment record
//! - POST   /queue                                      - create a queue entry
//! - GET    /queue                                      - filtered, paginated listing
//! - POST   /queue/{entry_id}/status                    - apply a status transition
//! - DELETE /queue/{entry_id}                           - soft-delete an entry
//! - GET    /queue/clinicians/{clinician_id}            - a clinician's queue in order
//! - GET    /queue/clinicians/{clinician_id}/statistics - same-day statistics
//! - PUT    /queue/clinicians/{clinician_id}/order      - explicit reorder
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::cors::{Any, CorsLayer};

use careflow_service::{QueueService, ServiceConfig, SystemClock};
use careflow_storage::MemoryStore;

use self::handlers::{
    handle_change_status, handle_create_appointment, handle_create_entry, handle_doctor_queue,
    handle_health, handle_list_entries, handle_not_found, handle_register_clinician,
    handle_register_patient, handle_remove_entry, handle_reorder, handle_statistics,
};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};

/// Default rate limit: 120 requests per minute per IP.
const DEFAULT_RATE_LIMIT: u64 = 120;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Construct a JSON error response with a stable code and a message.
fn json_error(status: StatusCode, code: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"error": {"code": code, "message": message}})),
    )
}

/// Start the HTTP server on the given port.
///
/// Security:
/// - CORS: permissive (`Any` origin) for local dev; tighten for production.
/// - Rate limit: per-IP, `CAREFLOW_RATE_LIMIT` env var (default 120/min).
/// - API key: if `CAREFLOW_API_KEY` is set, all endpoints except /health
///   require it.
pub async fn start_server(
    port: u16,
    avg_consult_minutes: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(MemoryStore::new());
    let config = ServiceConfig {
        average_consult_minutes: avg_consult_minutes,
        ..ServiceConfig::default()
    };
    let service = QueueService::with_config(Arc::clone(&store), Arc::new(SystemClock), config);

    let rate_limit = std::env::var("CAREFLOW_RATE_LIMIT")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT);

    let api_key = std::env::var("CAREFLOW_API_KEY")
        .ok()
        .filter(|k| !k.is_empty());

    if api_key.is_some() {
        eprintln!("API key authentication enabled");
    }
    eprintln!("Rate limit: {rate_limit} requests per minute per IP");

    let state = Arc::new(AppState {
        service,
        store,
        rate_limiter: RateLimiter::new(rate_limit),
        api_key,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/patients", post(handle_register_patient))
        .route("/clinicians", post(handle_register_clinician))
        .route("/appointments", post(handle_create_appointment))
        .route("/queue", post(handle_create_entry).get(handle_list_entries))
        .route("/queue/{entry_id}/status", post(handle_change_status))
        .route("/queue/{entry_id}", delete(handle_remove_entry))
        .route("/queue/clinicians/{clinician_id}", get(handle_doctor_queue))
        .route(
            "/queue/clinicians/{clinician_id}/statistics",
            get(handle_statistics),
        )
        .route(
            "/queue/clinicians/{clinician_id}/order",
            put(handle_reorder),
        )
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    eprintln!("Careflow queue service listening on http://0.0.0.0:{port}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    eprintln!("\nServer shut down.");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    eprintln!("\nReceived shutdown signal...");
}
