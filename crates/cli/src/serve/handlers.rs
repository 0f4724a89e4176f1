//! Route handlers: seeding endpoints, queue operations, health.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use time::{Date, OffsetDateTime};

use careflow_core::{
    Appointment, AppointmentId, AppointmentStatus, ClinicianId, CreateEntryRequest, EntryId,
    PatientId, Priority, QueueStatus,
};
use careflow_service::ServiceError;
use careflow_storage::{EntryFilter, FlowStore, KindFilter, Page, StorageError};

use super::json_error;
use super::middleware::require_identity;
use super::state::AppState;

/// Map a service error onto an HTTP status and JSON body. Validation
/// failures carry the per-field detail; everything else is code+message.
fn error_response(err: &ServiceError) -> Response {
    let status = match err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::InvalidTransition { .. } | ServiceError::InvalidReorderSet { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ServiceError::DuplicateLink { .. } | ServiceError::Conflict { .. } => StatusCode::CONFLICT,
        ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let mut body = serde_json::json!({
        "error": { "code": err.code(), "message": err.to_string() }
    });
    if let ServiceError::Validation(v) = err {
        if let Ok(fields) = serde_json::to_value(&v.errors) {
            body["error"]["fields"] = fields;
        }
    }
    (status, Json(body)).into_response()
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not_found", "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "service": "careflow",
    });
    (StatusCode::OK, Json(response))
}

// ── Seeding endpoints (collaborator stand-ins) ──────────────────────────

#[derive(Deserialize)]
pub(crate) struct RegisterPatientRequest {
    patient_id: String,
}

/// POST /patients
pub(crate) async fn handle_register_patient(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterPatientRequest>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if request.patient_id.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_failed",
            "patient_id is required",
        )
        .into_response();
    }
    match state
        .store
        .register_patient(&ctx.tenant_id, &PatientId::new(request.patient_id.trim()))
        .await
    {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"registered": true})),
        )
            .into_response(),
        Err(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", &e.to_string())
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RegisterClinicianRequest {
    clinician_id: String,
}

/// POST /clinicians
pub(crate) async fn handle_register_clinician(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<RegisterClinicianRequest>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if request.clinician_id.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_failed",
            "clinician_id is required",
        )
        .into_response();
    }
    match state
        .store
        .register_clinician(
            &ctx.tenant_id,
            &ClinicianId::new(request.clinician_id.trim()),
        )
        .await
    {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"registered": true})),
        )
            .into_response(),
        Err(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", &e.to_string())
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct CreateAppointmentRequest {
    appointment_id: Option<String>,
    patient_id: String,
    clinician_id: String,
    #[serde(with = "time::serde::rfc3339")]
    scheduled_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    scheduled_end: OffsetDateTime,
}

/// POST /appointments
pub(crate) async fn handle_create_appointment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateAppointmentRequest>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    if request.patient_id.trim().is_empty() || request.clinician_id.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            "validation_failed",
            "patient_id and clinician_id are required",
        )
        .into_response();
    }

    let appointment = Appointment {
        id: AppointmentId::new(
            request
                .appointment_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        ),
        tenant_id: ctx.tenant_id.clone(),
        patient_id: PatientId::new(request.patient_id.trim()),
        clinician_id: ClinicianId::new(request.clinician_id.trim()),
        scheduled_start: request.scheduled_start,
        scheduled_end: request.scheduled_end,
        status: AppointmentStatus::Scheduled,
        arrived_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        cancel_reason: None,
        version: 0,
    };

    let outcome: Result<(), StorageError> = async {
        let mut snapshot = state.store.begin_snapshot().await?;
        if let Err(e) = state
            .store
            .insert_appointment(&mut snapshot, &appointment)
            .await
        {
            let _ = state.store.abort_snapshot(snapshot).await;
            return Err(e);
        }
        state.store.commit_snapshot(snapshot).await
    }
    .await;

    match outcome {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"appointment": appointment})),
        )
            .into_response(),
        Err(StorageError::AlreadyExists { .. }) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            "appointment id already exists",
        )
        .into_response(),
        Err(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", &e.to_string())
                .into_response()
        }
    }
}

// ── Queue operations ────────────────────────────────────────────────────

/// POST /queue
pub(crate) async fn handle_create_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateEntryRequest>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state.service.create_entry(&request, &ctx).await {
        Ok(result) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "entry": result.value,
                "warnings": result.warnings,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
pub(crate) struct ChangeStatusRequest {
    status: QueueStatus,
    reason: Option<String>,
}

/// POST /queue/{entry_id}/status
pub(crate) async fn handle_change_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
    Json(request): Json<ChangeStatusRequest>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .service
        .change_status(
            &EntryId::new(entry_id),
            request.status,
            request.reason,
            &ctx,
        )
        .await
    {
        Ok(result) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "entry": result.value,
                "warnings": result.warnings,
            })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// DELETE /queue/{entry_id}
pub(crate) async fn handle_remove_entry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(entry_id): Path<String>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .service
        .remove_entry(&EntryId::new(entry_id), &ctx)
        .await
    {
        Ok(entry) => {
            (StatusCode::OK, Json(serde_json::json!({"entry": entry}))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
pub(crate) struct DoctorQueueQuery {
    #[serde(default)]
    include_in_consult: bool,
}

/// GET /queue/clinicians/{clinician_id}
pub(crate) async fn handle_doctor_queue(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(clinician_id): Path<String>,
    Query(query): Query<DoctorQueueQuery>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .service
        .doctor_queue(
            &ClinicianId::new(clinician_id),
            query.include_in_consult,
            &ctx,
        )
        .await
    {
        Ok(entries) => {
            (StatusCode::OK, Json(serde_json::json!({"entries": entries}))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// GET /queue/clinicians/{clinician_id}/statistics
pub(crate) async fn handle_statistics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(clinician_id): Path<String>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .service
        .statistics(&ClinicianId::new(clinician_id), &ctx)
        .await
    {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
pub(crate) struct ReorderRequest {
    entry_ids: Vec<EntryId>,
}

/// PUT /queue/clinicians/{clinician_id}/order
pub(crate) async fn handle_reorder(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(clinician_id): Path<String>,
    Json(request): Json<ReorderRequest>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    match state
        .service
        .reorder(&ClinicianId::new(clinician_id), &request.entry_ids, &ctx)
        .await
    {
        Ok(entries) => {
            (StatusCode::OK, Json(serde_json::json!({"entries": entries}))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    status: Option<QueueStatus>,
    priority: Option<Priority>,
    kind: Option<KindFilter>,
    day: Option<Date>,
    patient_id: Option<String>,
    clinician_id: Option<String>,
    page: Option<u64>,
    per_page: Option<u64>,
}

/// GET /queue
pub(crate) async fn handle_list_entries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let ctx = match require_identity(&headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };
    let filter = EntryFilter {
        status: query.status,
        priority: query.priority,
        kind: query.kind,
        day: query.day,
        patient_id: query.patient_id.map(PatientId::new),
        clinician_id: query.clinician_id.map(ClinicianId::new),
    };
    let default_page = Page::default();
    let page = Page {
        page: query.page.unwrap_or(default_page.page),
        per_page: query.per_page.unwrap_or(default_page.per_page),
    };
    match state.service.list_entries(&filter, &page, &ctx).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response(&e),
    }
}
