//! The appointment status bridge: queue transitions cascade into the
//! linked appointment, one-directionally and forward-only.
//!
//! The mapping itself is pure and lives in `careflow_core::bridge`; this
//! module performs the tenant-scoped load and stages the write into the
//! caller's snapshot, so the cascade commits atomically with the queue
//! transition that triggered it.
//!
//! A missing or foreign-tenant appointment is an anomaly, not a failure:
//! the queue is the operational source of truth once a patient has
//! checked in, so the transition stands and the caller gets an
//! [`ServiceWarning::OrphanedQueueLink`] to surface for remediation.

use time::OffsetDateTime;

use careflow_core::{apply_cascade, AppointmentCascade, AppointmentId, TenantId};
use careflow_storage::{FlowStore, StorageError};

use crate::error::ServiceWarning;

/// What the bridge did with a cascade request.
pub(crate) enum CascadeOutcome {
    /// The appointment update is staged in the snapshot.
    Staged,
    /// The appointment was already at or past the target; nothing staged.
    NoChange,
    /// The appointment could not be resolved within the tenant.
    Orphaned(ServiceWarning),
}

/// Load the linked appointment and stage the cascade write.
pub(crate) async fn stage_cascade<S: FlowStore>(
    store: &S,
    snapshot: &mut S::Snapshot,
    tenant_id: &TenantId,
    appointment_id: &AppointmentId,
    cascade: AppointmentCascade,
    now: OffsetDateTime,
    reason: Option<&str>,
) -> Result<CascadeOutcome, StorageError> {
    if cascade == AppointmentCascade::None {
        return Ok(CascadeOutcome::NoChange);
    }

    let mut appointment = match store.get_appointment(tenant_id, appointment_id).await {
        Ok(appointment) => appointment,
        Err(StorageError::AppointmentNotFound { .. }) => {
            tracing::warn!(
                tenant = %tenant_id,
                appointment = %appointment_id,
                "queue entry references an unresolvable appointment"
            );
            return Ok(CascadeOutcome::Orphaned(ServiceWarning::OrphanedQueueLink {
                appointment_id: appointment_id.clone(),
                message: "linked appointment not found in tenant; queue status applied without \
                          appointment cascade"
                    .to_string(),
            }));
        }
        Err(e) => return Err(e),
    };

    let expected_version = appointment.version;
    if !apply_cascade(&mut appointment, cascade, now, reason) {
        return Ok(CascadeOutcome::NoChange);
    }

    store
        .update_appointment(snapshot, &appointment, expected_version)
        .await?;
    Ok(CascadeOutcome::Staged)
}
