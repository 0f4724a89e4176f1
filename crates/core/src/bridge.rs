//! The appointment cascade mapping.
//!
//! One-directional: queue status drives appointment status, never the
//! reverse. Once a patient has checked in, the queue entry is the
//! operational source of truth; this module says what each queue event
//! means for the linked appointment, and the monotonic guard in
//! [`apply_cascade`] makes sure an appointment is never moved backward.

use time::OffsetDateTime;

use crate::appointment::{Appointment, AppointmentStatus};
use crate::entry::QueueStatus;

/// What a queue event asks of the linked appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentCascade {
    /// No appointment change (skipped entries keep the appointment as-is).
    None,
    /// Patient checked in: appointment moves to `InQueue`, `arrived_at` set.
    CheckIn,
    /// Consultation begun (called or in progress): appointment moves to
    /// `InProgress`, `started_at` set.
    StartConsultation,
    /// Consultation finished: appointment `Completed`, `completed_at` set.
    Complete,
    /// Queue-initiated cancellation: appointment `Cancelled`, reason copied.
    Cancel,
}

/// Map a queue status (just entered) to its appointment cascade.
pub fn cascade_for(status: QueueStatus) -> AppointmentCascade {
    match status {
        QueueStatus::Waiting => AppointmentCascade::CheckIn,
        QueueStatus::Called | QueueStatus::InProgress => AppointmentCascade::StartConsultation,
        QueueStatus::Completed => AppointmentCascade::Complete,
        QueueStatus::Cancelled => AppointmentCascade::Cancel,
        QueueStatus::Skipped => AppointmentCascade::None,
    }
}

/// Apply a cascade to an appointment, forward-only.
///
/// Returns `true` when the appointment changed and needs persisting.
/// A cascade targeting a status whose rank is not strictly greater than
/// the current one is a no-op; timestamps are set only the first time
/// their edge fires.
pub fn apply_cascade(
    appointment: &mut Appointment,
    cascade: AppointmentCascade,
    now: OffsetDateTime,
    reason: Option<&str>,
) -> bool {
    let target = match cascade {
        AppointmentCascade::None => return false,
        AppointmentCascade::CheckIn => AppointmentStatus::InQueue,
        AppointmentCascade::StartConsultation => AppointmentStatus::InProgress,
        AppointmentCascade::Complete => AppointmentStatus::Completed,
        AppointmentCascade::Cancel => AppointmentStatus::Cancelled,
    };

    if target.rank() <= appointment.status.rank() {
        return false;
    }

    match target {
        AppointmentStatus::InQueue => {
            if appointment.arrived_at.is_none() {
                appointment.arrived_at = Some(now);
            }
        }
        AppointmentStatus::InProgress => {
            if appointment.started_at.is_none() {
                appointment.started_at = Some(now);
            }
        }
        AppointmentStatus::Completed => {
            if appointment.completed_at.is_none() {
                appointment.completed_at = Some(now);
            }
        }
        AppointmentStatus::Cancelled => {
            if appointment.cancelled_at.is_none() {
                appointment.cancelled_at = Some(now);
            }
            appointment.cancel_reason = reason.map(str::to_string);
        }
        _ => {}
    }

    appointment.status = target;
    true
}
