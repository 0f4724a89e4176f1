//! The queue entry record: one patient's ticket in a clinician's waiting line.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{
    AppointmentId, ClinicianId, EntryId, PatientId, QueueNumber, TenantId, UserId,
};

/// Priority class of a waiting entry, the primary sort key for natural
/// ordering. Urgent sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Numeric rank; higher sorts earlier in the queue.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Urgent => 3,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!(
                "unknown priority '{other}' (expected low, normal, high, or urgent)"
            )),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of a queue entry.
///
/// `Completed`, `Skipped`, and `Cancelled` are terminal. The allowed
/// transitions live in [`crate::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Called,
    InProgress,
    Completed,
    Skipped,
    Cancelled,
}

impl QueueStatus {
    /// Terminal states are never exited.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueStatus::Completed | QueueStatus::Skipped | QueueStatus::Cancelled
        )
    }

    /// Whether an entry in this status occupies a slot in the active
    /// waiting ordering.
    pub fn in_waiting_order(self) -> bool {
        self == QueueStatus::Waiting
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueStatus::Waiting => "waiting",
            QueueStatus::Called => "called",
            QueueStatus::InProgress => "in_progress",
            QueueStatus::Completed => "completed",
            QueueStatus::Skipped => "skipped",
            QueueStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// How the entry came to exist: derived from a scheduled appointment at
/// check-in, or created ad hoc for a walk-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    Appointment { appointment_id: AppointmentId },
    WalkIn,
}

impl EntryKind {
    pub fn appointment_id(&self) -> Option<&AppointmentId> {
        match self {
            EntryKind::Appointment { appointment_id } => Some(appointment_id),
            EntryKind::WalkIn => None,
        }
    }
}

/// Soft-delete tag consulted by every query path. Deleted entries are
/// excluded from ordering and listing but retained for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Deleted {
        #[serde(with = "time::serde::rfc3339")]
        deleted_at: OffsetDateTime,
    },
}

impl Lifecycle {
    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active)
    }
}

/// A patient's waiting-room ticket.
///
/// Participants and `joined_at` are immutable after creation; `position`
/// changes only through the ordering engine; status changes only through
/// the transition table. `version` is the optimistic-concurrency token
/// maintained by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub queue_number: QueueNumber,
    #[serde(flatten)]
    pub kind: EntryKind,
    pub patient_id: PatientId,
    pub clinician_id: ClinicianId,
    pub priority: Priority,
    /// 1-based rank within the clinician's active waiting set.
    pub position: u32,
    pub status: QueueStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub called_at: Option<OffsetDateTime>,
    pub called_by: Option<UserId>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub cancelled_at: Option<OffsetDateTime>,
    pub cancel_reason: Option<String>,
    /// Minutes between joining and the start of consultation. Set once,
    /// by the completion transition.
    pub actual_wait_minutes: Option<i64>,
    /// Derived at read time from position and the configured average
    /// consultation length. Never persisted.
    pub estimated_wait_minutes: Option<i64>,
    pub reason_for_visit: Option<String>,
    pub notes: Option<String>,
    pub lifecycle: Lifecycle,
    /// Optimistic-concurrency version, bumped by the store on every update.
    pub version: i64,
}

impl QueueEntry {
    /// Whether this entry blocks another entry from linking to the same
    /// appointment: not soft-deleted and not in a terminal status.
    pub fn is_active_link(&self) -> bool {
        self.lifecycle.is_active() && !self.status.is_terminal()
    }
}
