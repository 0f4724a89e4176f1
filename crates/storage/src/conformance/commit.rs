use std::future::Future;

use careflow_core::{ClinicianId, EntryId, Priority, TenantId};
use time::macros::date;

use super::{make_entry, seed_entry, TestResult};
use crate::{FlowStore, SequenceKey, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "commit",
            "failed_commit_applies_nothing",
            failed_commit_applies_nothing(factory().await).await,
        ),
        TestResult::from_result(
            "commit",
            "dropped_snapshot_discards_writes",
            dropped_snapshot_discards_writes(factory().await).await,
        ),
        TestResult::from_result(
            "commit",
            "aborted_snapshot_discards_writes",
            aborted_snapshot_discards_writes(factory().await).await,
        ),
        TestResult::from_result(
            "commit",
            "insert_and_sequence_commit_together",
            insert_and_sequence_commit_together(factory().await).await,
        ),
    ]
}

/// A snapshot holding one applicable write and one conflicting write must
/// apply neither. The conflict is manufactured by staging two updates of
/// the same entry with the same expected version: both pass the staging
/// check against committed state, and the second must fail at commit
/// after the first bumped the version.
async fn failed_commit_applies_nothing<S: FlowStore>(store: S) -> Result<(), String> {
    let entry = make_entry("clinic-a", "e-1", "dr-lee", 1);
    seed_entry(&store, &entry).await?;

    let mut first = entry.clone();
    first.priority = Priority::High;
    let mut second = entry.clone();
    second.priority = Priority::Urgent;

    let mut snap = store
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    store
        .update_entry(&mut snap, &first, 0)
        .await
        .map_err(|e| format!("stage first: {e}"))?;
    store
        .update_entry(&mut snap, &second, 0)
        .await
        .map_err(|e| format!("stage second: {e}"))?;

    match store.commit_snapshot(snap).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        Err(e) => return Err(format!("expected ConcurrentConflict at commit, got: {e}")),
        Ok(()) => return Err("conflicting batch committed".to_string()),
    }

    // The first staged write must not have leaked through.
    let read = store
        .get_entry(&TenantId::new("clinic-a"), &EntryId::new("e-1"))
        .await
        .map_err(|e| format!("get: {e}"))?;
    if read.priority != Priority::Normal || read.version != 0 {
        return Err(format!(
            "partial application observed: priority {:?}, version {}",
            read.priority, read.version
        ));
    }
    Ok(())
}

async fn dropped_snapshot_discards_writes<S: FlowStore>(store: S) -> Result<(), String> {
    {
        let mut snap = store
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        store
            .insert_entry(&mut snap, &make_entry("clinic-a", "e-1", "dr-lee", 1))
            .await
            .map_err(|e| format!("insert: {e}"))?;
        // Dropped here without commit.
    }

    match store
        .get_entry(&TenantId::new("clinic-a"), &EntryId::new("e-1"))
        .await
    {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected EntryNotFound, got: {e}")),
        Ok(_) => Err("write from a dropped snapshot became visible".to_string()),
    }
}

async fn aborted_snapshot_discards_writes<S: FlowStore>(store: S) -> Result<(), String> {
    let mut snap = store
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    store
        .insert_entry(&mut snap, &make_entry("clinic-a", "e-1", "dr-lee", 1))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    store
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    match store
        .get_entry(&TenantId::new("clinic-a"), &EntryId::new("e-1"))
        .await
    {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected EntryNotFound, got: {e}")),
        Ok(_) => Err("write from an aborted snapshot became visible".to_string()),
    }
}

/// The allocator's pattern: a sequence advance and the entry insert it
/// numbered land in one snapshot and become visible together.
async fn insert_and_sequence_commit_together<S: FlowStore>(store: S) -> Result<(), String> {
    let key = SequenceKey {
        tenant_id: TenantId::new("clinic-a"),
        clinician_id: ClinicianId::new("dr-lee"),
        day: date!(2025 - 03 - 10),
    };

    let mut snap = store
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let seq = store
        .advance_sequence(&mut snap, &key, 0)
        .await
        .map_err(|e| format!("advance: {e}"))?;
    if seq != 1 {
        return Err(format!("expected sequence value 1, got {seq}"));
    }

    // Not visible before commit.
    let visible = store
        .read_sequence(&key)
        .await
        .map_err(|e| format!("read_sequence: {e}"))?;
    if visible != 0 {
        return Err(format!(
            "uncommitted sequence advance visible: read {visible}"
        ));
    }

    store
        .insert_entry(&mut snap, &make_entry("clinic-a", "e-1", "dr-lee", 1))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    store
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let committed = store
        .read_sequence(&key)
        .await
        .map_err(|e| format!("read_sequence: {e}"))?;
    if committed != 1 {
        return Err(format!("expected committed sequence 1, got {committed}"));
    }
    store
        .get_entry(&TenantId::new("clinic-a"), &EntryId::new("e-1"))
        .await
        .map_err(|e| format!("entry missing after commit: {e}"))?;
    Ok(())
}
