use careflow_core::{AppointmentId, EntryId, QueueNumber, TenantId};

/// All errors that can be returned by a `FlowStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency conflict: another writer changed the record
    /// between the caller's read and this write.
    #[error("concurrent conflict on {entity} {id}: expected version {expected_version}")]
    ConcurrentConflict {
        entity: &'static str,
        id: String,
        expected_version: i64,
    },

    /// The sequence compare-and-swap lost a race: the counter moved past
    /// the expected value between read and commit.
    #[error("sequence conflict for {key}: expected {expected}")]
    SequenceConflict { key: String, expected: u64 },

    /// No queue entry with this id is visible to the tenant.
    #[error("queue entry not found: {tenant_id}/{entry_id}")]
    EntryNotFound {
        tenant_id: TenantId,
        entry_id: EntryId,
    },

    /// No appointment with this id is visible to the tenant.
    #[error("appointment not found: {tenant_id}/{appointment_id}")]
    AppointmentNotFound {
        tenant_id: TenantId,
        appointment_id: AppointmentId,
    },

    /// An insert collided with an existing record id.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// An insert collided with an already-issued queue number.
    #[error("duplicate queue number for tenant {tenant_id}: {queue_number}")]
    DuplicateQueueNumber {
        tenant_id: TenantId,
        queue_number: QueueNumber,
    },

    /// A backend-specific failure (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Transient contention errors the caller may retry after re-reading.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::ConcurrentConflict { .. }
                | StorageError::SequenceConflict { .. }
                | StorageError::DuplicateQueueNumber { .. }
        )
    }
}
