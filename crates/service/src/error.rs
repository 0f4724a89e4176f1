//! The service error taxonomy.
//!
//! Every failure crossing the service boundary is one of these kinds;
//! raw storage errors never leak. Each error carries a stable
//! machine-readable code next to its human-readable message.

use serde::Serialize;

use careflow_core::{
    AppointmentId, EntryId, QueueStatus, ReorderError, TransitionError, ValidationError,
};
use careflow_storage::StorageError;

/// Typed failure returned by every service operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed input; the caller corrects and resubmits. Never retried.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A record is absent or not visible to the caller's tenant.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The requested status change is not permitted from the current
    /// state. Usually a stale client view; never retried automatically.
    #[error("invalid queue status transition: {from} -> {to}")]
    InvalidTransition { from: QueueStatus, to: QueueStatus },

    /// The appointment already has an active queue entry.
    #[error("appointment {appointment_id} is already linked to active queue entry {entry_id}")]
    DuplicateLink {
        appointment_id: AppointmentId,
        entry_id: EntryId,
    },

    /// The reorder id list did not exactly match the active waiting set.
    #[error("reorder set mismatch: unexpected {unexpected:?}, missing {missing:?}")]
    InvalidReorderSet {
        unexpected: Vec<EntryId>,
        missing: Vec<EntryId>,
    },

    /// Contention on the sequence counter or an entry version outlasted
    /// the internal retry budget.
    #[error("operation abandoned after {attempts} conflicting attempts")]
    Conflict { attempts: u32 },

    /// A wrapped backend failure.
    #[error("internal storage failure: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code for API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_failed",
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::DuplicateLink { .. } => "duplicate_link",
            ServiceError::InvalidReorderSet { .. } => "invalid_reorder_set",
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::InvalidTransition { from, to } => {
                ServiceError::InvalidTransition { from, to }
            }
        }
    }
}

impl From<ReorderError> for ServiceError {
    fn from(e: ReorderError) -> Self {
        match e {
            ReorderError::SetMismatch {
                unexpected,
                missing,
            } => ServiceError::InvalidReorderSet {
                unexpected,
                missing,
            },
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::EntryNotFound { entry_id, .. } => ServiceError::NotFound {
                kind: "queue entry",
                id: entry_id.to_string(),
            },
            StorageError::AppointmentNotFound { appointment_id, .. } => ServiceError::NotFound {
                kind: "appointment",
                id: appointment_id.to_string(),
            },
            // Contention that escaped the retry loop still surfaces as a
            // conflict, not an internal error.
            StorageError::ConcurrentConflict { .. }
            | StorageError::SequenceConflict { .. }
            | StorageError::DuplicateQueueNumber { .. } => ServiceError::Conflict { attempts: 1 },
            StorageError::AlreadyExists { entity, id } => {
                ServiceError::Internal(format!("unexpected duplicate {entity}: {id}"))
            }
            StorageError::Backend(msg) => ServiceError::Internal(msg),
        }
    }
}

/// Non-fatal anomaly attached to an otherwise-successful response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ServiceWarning {
    /// A queue entry references an appointment that no longer resolves
    /// within the tenant. The queue transition stands; the link needs
    /// remediation.
    OrphanedQueueLink {
        appointment_id: AppointmentId,
        message: String,
    },
}

/// A successful result plus any warnings gathered along the way.
#[derive(Debug, Clone, Serialize)]
pub struct WithWarnings<T> {
    pub value: T,
    pub warnings: Vec<ServiceWarning>,
}

impl<T> WithWarnings<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn new(value: T, warnings: Vec<ServiceWarning>) -> Self {
        Self { value, warnings }
    }
}
