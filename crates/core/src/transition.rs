//! The queue status state machine.
//!
//! Transitions are validated against an explicit table and applied by a
//! pure function that stamps the timestamps owned by each edge. Each
//! timestamp is set exactly once; terminal states are never exited.
//!
//! ```text
//! waiting ──► called ──► in_progress ──► completed
//!    │           │            │
//!    │           │            └────────► cancelled
//!    │           ├──────────────────────► cancelled
//!    │           └──────────────────────► skipped
//!    ├──────────────────────────────────► skipped
//!    ├──────────────────────────────────► cancelled
//!    └──────────► in_progress   (direct call-in)
//! ```

use time::OffsetDateTime;

use crate::entry::{QueueEntry, QueueStatus};
use crate::ids::UserId;

/// Error raised for any status change not present in the transition table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("invalid queue status transition: {from} -> {to}")]
    InvalidTransition { from: QueueStatus, to: QueueStatus },
}

/// Record of an accepted transition, returned so callers can decide which
/// follow-up work (renormalization, appointment cascade) it triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransition {
    pub from: QueueStatus,
    pub to: QueueStatus,
    /// True when the entry held a slot in the active waiting ordering and
    /// no longer does; the caller must renormalize the remaining positions.
    pub left_waiting: bool,
}

/// The allowed-transition table.
pub fn is_allowed(from: QueueStatus, to: QueueStatus) -> bool {
    use QueueStatus::*;
    matches!(
        (from, to),
        (Waiting, Called)
            | (Called, InProgress)
            | (Waiting, InProgress)
            | (InProgress, Completed)
            | (Waiting, Skipped)
            | (Called, Skipped)
            | (Waiting, Cancelled)
            | (Called, Cancelled)
            | (InProgress, Cancelled)
    )
}

/// Validate and apply a status transition, stamping the edge's timestamps.
///
/// On the completion edge the actual wait is derived as the whole minutes
/// between `joined_at` and `started_at`. The cancel edge records the
/// caller-supplied reason; every other edge ignores `reason`.
pub fn apply_transition(
    entry: &mut QueueEntry,
    to: QueueStatus,
    now: OffsetDateTime,
    actor: &UserId,
    reason: Option<String>,
) -> Result<AppliedTransition, TransitionError> {
    let from = entry.status;
    if !is_allowed(from, to) {
        return Err(TransitionError::InvalidTransition { from, to });
    }

    match to {
        QueueStatus::Called => {
            entry.called_at = Some(now);
            entry.called_by = Some(actor.clone());
        }
        QueueStatus::InProgress => {
            entry.started_at = Some(now);
        }
        QueueStatus::Completed => {
            entry.completed_at = Some(now);
            if let Some(started) = entry.started_at {
                entry.actual_wait_minutes =
                    Some((started - entry.joined_at).whole_minutes());
            }
        }
        QueueStatus::Cancelled => {
            entry.cancelled_at = Some(now);
            entry.cancel_reason = reason;
        }
        QueueStatus::Skipped => {}
        // Unreachable: no edge in the table targets Waiting.
        QueueStatus::Waiting => {}
    }

    entry.status = to;
    Ok(AppliedTransition {
        from,
        to,
        left_waiting: from == QueueStatus::Waiting,
    })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::entry::{EntryKind, Lifecycle, Priority};
    use crate::ids::{ClinicianId, EntryId, PatientId, QueueNumber, TenantId};

    fn entry(status: QueueStatus) -> QueueEntry {
        QueueEntry {
            id: EntryId::new("e-1"),
            tenant_id: TenantId::new("t-1"),
            queue_number: QueueNumber::new("20250101-dr-lee-001"),
            kind: EntryKind::WalkIn,
            patient_id: PatientId::new("p-1"),
            clinician_id: ClinicianId::new("dr-lee"),
            priority: Priority::Normal,
            position: 1,
            status,
            joined_at: datetime!(2025-01-01 09:00 UTC),
            called_at: None,
            called_by: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
            actual_wait_minutes: None,
            estimated_wait_minutes: None,
            reason_for_visit: None,
            notes: None,
            lifecycle: Lifecycle::Active,
            version: 0,
        }
    }

    fn actor() -> UserId {
        UserId::new("u-1")
    }

    #[test]
    fn call_stamps_called_at_and_called_by() {
        let mut e = entry(QueueStatus::Waiting);
        let now = datetime!(2025-01-01 09:10 UTC);
        let applied = apply_transition(&mut e, QueueStatus::Called, now, &actor(), None).unwrap();
        assert_eq!(applied.from, QueueStatus::Waiting);
        assert!(applied.left_waiting);
        assert_eq!(e.called_at, Some(now));
        assert_eq!(e.called_by, Some(actor()));
    }

    #[test]
    fn direct_call_in_from_waiting_stamps_started_at() {
        let mut e = entry(QueueStatus::Waiting);
        let now = datetime!(2025-01-01 09:12 UTC);
        apply_transition(&mut e, QueueStatus::InProgress, now, &actor(), None).unwrap();
        assert_eq!(e.status, QueueStatus::InProgress);
        assert_eq!(e.started_at, Some(now));
        assert_eq!(e.called_at, None);
    }

    #[test]
    fn completion_derives_actual_wait_from_joined_to_started() {
        let mut e = entry(QueueStatus::Waiting);
        apply_transition(
            &mut e,
            QueueStatus::InProgress,
            datetime!(2025-01-01 09:25 UTC),
            &actor(),
            None,
        )
        .unwrap();
        apply_transition(
            &mut e,
            QueueStatus::Completed,
            datetime!(2025-01-01 09:45 UTC),
            &actor(),
            None,
        )
        .unwrap();
        assert_eq!(e.actual_wait_minutes, Some(25));
        assert_eq!(e.completed_at, Some(datetime!(2025-01-01 09:45 UTC)));
    }

    #[test]
    fn cancel_records_reason() {
        let mut e = entry(QueueStatus::Called);
        let now = datetime!(2025-01-01 09:30 UTC);
        apply_transition(
            &mut e,
            QueueStatus::Cancelled,
            now,
            &actor(),
            Some("patient left".to_string()),
        )
        .unwrap();
        assert_eq!(e.cancelled_at, Some(now));
        assert_eq!(e.cancel_reason.as_deref(), Some("patient left"));
    }

    #[test]
    fn skip_sets_no_timestamps() {
        let mut e = entry(QueueStatus::Waiting);
        apply_transition(
            &mut e,
            QueueStatus::Skipped,
            datetime!(2025-01-01 09:30 UTC),
            &actor(),
            None,
        )
        .unwrap();
        assert_eq!(e.status, QueueStatus::Skipped);
        assert_eq!(e.called_at, None);
        assert_eq!(e.started_at, None);
        assert_eq!(e.completed_at, None);
    }

    #[test]
    fn terminal_states_are_final() {
        for terminal in [
            QueueStatus::Completed,
            QueueStatus::Skipped,
            QueueStatus::Cancelled,
        ] {
            for target in [
                QueueStatus::Waiting,
                QueueStatus::Called,
                QueueStatus::InProgress,
                QueueStatus::Completed,
                QueueStatus::Cancelled,
            ] {
                let mut e = entry(terminal);
                let result = apply_transition(
                    &mut e,
                    target,
                    datetime!(2025-01-01 10:00 UTC),
                    &actor(),
                    None,
                );
                assert_eq!(
                    result,
                    Err(TransitionError::InvalidTransition {
                        from: terminal,
                        to: target
                    })
                );
                assert_eq!(e.status, terminal, "rejected transition must not mutate");
            }
        }
    }

    #[test]
    fn completed_cannot_return_to_waiting() {
        let mut e = entry(QueueStatus::Completed);
        let err = apply_transition(
            &mut e,
            QueueStatus::Waiting,
            datetime!(2025-01-01 10:00 UTC),
            &actor(),
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TransitionError::InvalidTransition {
                from: QueueStatus::Completed,
                to: QueueStatus::Waiting
            }
        );
    }

    #[test]
    fn in_progress_cannot_be_skipped() {
        let mut e = entry(QueueStatus::InProgress);
        assert!(apply_transition(
            &mut e,
            QueueStatus::Skipped,
            datetime!(2025-01-01 10:00 UTC),
            &actor(),
            None,
        )
        .is_err());
    }
}
