//! The priority ordering engine.
//!
//! Defines the total order over a clinician's waiting entries and computes
//! position-change plans as pure data, so the orchestrator can stage every
//! reposition of a batch into a single store snapshot. Given the same
//! snapshot of entries the same plan always comes back; nothing here reads
//! a clock or randomness.
//!
//! `position` is the materialized canonical order: reads sort by it, and a
//! clinician's manual reorder survives later insertions and departures.
//! The comparator (priority desc, arrival asc, position asc) governs where
//! NEW entries are placed.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use time::OffsetDateTime;

use crate::entry::{Priority, QueueEntry};
use crate::ids::EntryId;

/// Total order over waiting entries: priority rank descending, then
/// arrival ascending, then explicit position, then id as the backstop
/// that makes the order total even on pathological data.
pub fn waiting_order(a: &QueueEntry, b: &QueueEntry) -> Ordering {
    b.priority
        .rank()
        .cmp(&a.priority.rank())
        .then_with(|| a.joined_at.cmp(&b.joined_at))
        .then_with(|| a.position.cmp(&b.position))
        .then_with(|| a.id.cmp(&b.id))
}

/// A single entry whose position must change, with its expected version
/// for the optimistic-concurrency write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionChange {
    pub entry_id: EntryId,
    pub new_position: u32,
    pub expected_version: i64,
}

/// Placement plan for a natural insert: the newcomer's position and the
/// +1 shifts of every entry at or below that slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertPlan {
    pub position: u32,
    pub shifts: Vec<PositionChange>,
}

/// Whether an existing waiting entry sorts ahead of a not-yet-inserted
/// candidate. Equal priority and equal arrival keeps the existing entry
/// ahead (earlier arrival wins ties; the incumbent is never displaced by
/// an equal).
fn sorts_before_candidate(
    existing: &QueueEntry,
    priority: Priority,
    joined_at: OffsetDateTime,
) -> bool {
    match existing.priority.rank().cmp(&priority.rank()) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => existing.joined_at <= joined_at,
    }
}

/// Compute the natural placement of a new waiting entry.
///
/// The position is one past the count of entries that sort before the
/// candidate; every entry at or below that slot shifts one deeper.
pub fn plan_insert(
    waiting: &[QueueEntry],
    priority: Priority,
    joined_at: OffsetDateTime,
) -> InsertPlan {
    let ahead = waiting
        .iter()
        .filter(|e| sorts_before_candidate(e, priority, joined_at))
        .count() as u32;
    let position = ahead + 1;

    let shifts = waiting
        .iter()
        .filter(|e| e.position >= position)
        .map(|e| PositionChange {
            entry_id: e.id.clone(),
            new_position: e.position + 1,
            expected_version: e.version,
        })
        .collect();

    InsertPlan { position, shifts }
}

/// Compact the remaining waiting set to positions 1..N after an entry
/// leaves the ordering. Relative order is preserved (sorted by current
/// position, id as tie-break), so manual reorders stay intact. Only
/// entries whose position actually changes appear in the plan.
pub fn plan_renormalize(waiting: &[QueueEntry]) -> Vec<PositionChange> {
    let mut by_position: Vec<&QueueEntry> = waiting.iter().collect();
    by_position.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));

    by_position
        .iter()
        .enumerate()
        .filter_map(|(idx, e)| {
            let target = idx as u32 + 1;
            (e.position != target).then(|| PositionChange {
                entry_id: e.id.clone(),
                new_position: target,
                expected_version: e.version,
            })
        })
        .collect()
}

/// Error raised when a reorder request does not exactly match the current
/// active waiting set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReorderError {
    /// The ordered id list added, dropped, or repeated entries. The ids
    /// are enumerated so the caller can see exactly what diverged from
    /// its (likely stale) view.
    #[error("reorder set mismatch: unexpected {unexpected:?}, missing {missing:?}")]
    SetMismatch {
        unexpected: Vec<EntryId>,
        missing: Vec<EntryId>,
    },
}

/// Validate an explicit reorder against the current waiting set and
/// produce the position reassignment 1..N in the given order.
///
/// The id list must be a permutation of the active waiting ids: no
/// additions, no drops, no duplicates. Priority is bypassed for this
/// call; subsequent natural inserts compare against the new positions.
pub fn validate_reorder(
    waiting: &[QueueEntry],
    ordered_ids: &[EntryId],
) -> Result<Vec<PositionChange>, ReorderError> {
    let current: BTreeSet<&EntryId> = waiting.iter().map(|e| &e.id).collect();
    let mut seen: BTreeSet<&EntryId> = BTreeSet::new();
    let mut unexpected: Vec<EntryId> = Vec::new();

    for id in ordered_ids {
        // A repeated id is "unexpected" on its second appearance.
        if !current.contains(id) || !seen.insert(id) {
            unexpected.push(id.clone());
        }
    }
    let missing: Vec<EntryId> = waiting
        .iter()
        .filter(|e| !seen.contains(&e.id))
        .map(|e| e.id.clone())
        .collect();

    if !unexpected.is_empty() || !missing.is_empty() {
        return Err(ReorderError::SetMismatch {
            unexpected,
            missing,
        });
    }

    let changes = ordered_ids
        .iter()
        .enumerate()
        .filter_map(|(idx, id)| {
            let target = idx as u32 + 1;
            waiting
                .iter()
                .find(|e| &e.id == id)
                .filter(|e| e.position != target)
                .map(|e| PositionChange {
                    entry_id: e.id.clone(),
                    new_position: target,
                    expected_version: e.version,
                })
        })
        .collect();

    Ok(changes)
}
