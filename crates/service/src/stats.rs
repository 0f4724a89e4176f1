//! Same-day queue statistics.

use std::collections::BTreeMap;

use serde::Serialize;
use time::Date;

use careflow_core::{ClinicianId, Priority, QueueEntry, QueueStatus};

/// Aggregated view of one clinician's queue activity for a calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatistics {
    pub clinician_id: ClinicianId,
    pub day: Date,
    pub total: u64,
    pub by_status: BTreeMap<QueueStatus, u64>,
    pub by_priority: BTreeMap<Priority, u64>,
    pub waiting: u64,
    pub completed: u64,
    /// Mean of `actual_wait_minutes` over the day's completed entries;
    /// absent until something completes.
    pub average_wait_minutes: Option<f64>,
}

/// Aggregate a day's entries. Pure; the caller supplies the already
/// tenant- and day-scoped slice.
pub(crate) fn aggregate(
    clinician_id: ClinicianId,
    day: Date,
    entries: &[QueueEntry],
) -> QueueStatistics {
    let mut by_status: BTreeMap<QueueStatus, u64> = BTreeMap::new();
    let mut by_priority: BTreeMap<Priority, u64> = BTreeMap::new();
    let mut wait_sum: i64 = 0;
    let mut wait_count: u64 = 0;

    for entry in entries {
        *by_status.entry(entry.status).or_insert(0) += 1;
        *by_priority.entry(entry.priority).or_insert(0) += 1;
        if entry.status == QueueStatus::Completed {
            if let Some(wait) = entry.actual_wait_minutes {
                wait_sum += wait;
                wait_count += 1;
            }
        }
    }

    let waiting = by_status.get(&QueueStatus::Waiting).copied().unwrap_or(0);
    let completed = by_status
        .get(&QueueStatus::Completed)
        .copied()
        .unwrap_or(0);
    let average_wait_minutes =
        (wait_count > 0).then(|| wait_sum as f64 / wait_count as f64);

    QueueStatistics {
        clinician_id,
        day,
        total: entries.len() as u64,
        by_status,
        by_priority,
        waiting,
        completed,
        average_wait_minutes,
    }
}
