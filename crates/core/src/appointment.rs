//! The appointment slice the queue cascades into.
//!
//! Only the fields the patient-flow core reads or writes are modeled here;
//! the full appointment record (billing, telemedicine links, reminders)
//! belongs to the scheduling module and is out of scope.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{AppointmentId, ClinicianId, PatientId, TenantId};

/// Appointment lifecycle status.
///
/// The queue cascade only ever moves an appointment forward along this
/// progression; see [`AppointmentStatus::rank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Arrived,
    InQueue,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Progression rank used by the monotonic-cascade guard. The bridge
    /// never moves an appointment to a status with a lower or equal rank.
    /// Terminal outcomes share the top rank so none of them can replace
    /// another.
    pub fn rank(self) -> u8 {
        match self {
            AppointmentStatus::Scheduled => 0,
            AppointmentStatus::Confirmed => 1,
            AppointmentStatus::Arrived => 2,
            AppointmentStatus::InQueue => 3,
            AppointmentStatus::InProgress => 4,
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::NoShow
        )
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Arrived => "arrived",
            AppointmentStatus::InQueue => "in_queue",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        };
        f.write_str(s)
    }
}

/// A scheduled visit. Once the patient checks in, the queue entry becomes
/// the operational source of truth and this record follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub tenant_id: TenantId,
    pub patient_id: PatientId,
    pub clinician_id: ClinicianId,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_end: OffsetDateTime,
    pub status: AppointmentStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub arrived_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancel_reason: Option<String>,
    /// Optimistic-concurrency version, bumped by the store on every update.
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_is_monotone_along_the_happy_path() {
        let path = [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Confirmed,
            AppointmentStatus::Arrived,
            AppointmentStatus::InQueue,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].rank() < pair[1].rank(), "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_outcomes_share_the_top_rank() {
        assert_eq!(
            AppointmentStatus::Completed.rank(),
            AppointmentStatus::Cancelled.rank()
        );
        assert_eq!(
            AppointmentStatus::Cancelled.rank(),
            AppointmentStatus::NoShow.rank()
        );
    }
}
