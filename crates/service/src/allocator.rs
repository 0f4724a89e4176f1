//! Queue number and position sequencing.
//!
//! Counters are scoped per (tenant, clinician, calendar day) and advanced
//! through the store's compare-and-swap, staged in the same snapshot as
//! the entry insert they number. The CAS is what serializes concurrent
//! creations for one clinician's day: the loser re-reads and retries.

use time::Date;

use careflow_core::{ClinicianId, QueueNumber, TenantId};
use careflow_storage::{FlowStore, SequenceKey, StorageError};

/// The counter key for a clinician's day.
pub(crate) fn sequence_key(
    tenant_id: &TenantId,
    clinician_id: &ClinicianId,
    day: Date,
) -> SequenceKey {
    SequenceKey {
        tenant_id: tenant_id.clone(),
        clinician_id: clinician_id.clone(),
        day,
    }
}

/// Render a ticket number: `{YYYYMMDD}-{clinician}-{NNN}`.
///
/// Tenant-wide uniqueness follows from the counter scope: the day and
/// clinician are embedded, and the trailing counter is unique within
/// that pair.
pub(crate) fn queue_number(day: Date, clinician_id: &ClinicianId, sequence: u64) -> QueueNumber {
    QueueNumber::new(format!(
        "{:04}{:02}{:02}-{}-{:03}",
        day.year(),
        u8::from(day.month()),
        day.day(),
        clinician_id,
        sequence
    ))
}

/// A freshly issued ticket.
pub(crate) struct Allocation {
    pub(crate) queue_number: QueueNumber,
}

/// Stage a counter advance and render the resulting ticket number.
///
/// `observed_sequence` is the counter value the caller read before opening
/// the snapshot; a raced CAS surfaces `StorageError::SequenceConflict`
/// and the caller retries from a fresh read.
pub(crate) async fn allocate<S: FlowStore>(
    store: &S,
    snapshot: &mut S::Snapshot,
    tenant_id: &TenantId,
    clinician_id: &ClinicianId,
    day: Date,
    observed_sequence: u64,
) -> Result<Allocation, StorageError> {
    let key = sequence_key(tenant_id, clinician_id, day);
    let sequence = store
        .advance_sequence(snapshot, &key, observed_sequence)
        .await?;
    Ok(Allocation {
        queue_number: queue_number(day, clinician_id, sequence),
    })
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn queue_number_embeds_day_clinician_and_counter() {
        let number = queue_number(date!(2025 - 03 - 10), &ClinicianId::new("dr-lee"), 7);
        assert_eq!(number.as_str(), "20250310-dr-lee-007");
    }

    #[test]
    fn queue_numbers_differ_across_scopes() {
        let day = date!(2025 - 03 - 10);
        let lee = queue_number(day, &ClinicianId::new("dr-lee"), 1);
        let patel = queue_number(day, &ClinicianId::new("dr-patel"), 1);
        let lee_next_day = queue_number(date!(2025 - 03 - 11), &ClinicianId::new("dr-lee"), 1);
        assert_ne!(lee, patel);
        assert_ne!(lee, lee_next_day);
    }
}
