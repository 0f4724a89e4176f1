use std::future::Future;

use careflow_core::{EntryId, Priority, TenantId};

use super::{make_appointment, make_entry, seed_appointment, seed_entry, TestResult};
use crate::{FlowStore, StorageError};

pub(super) async fn run_occ_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "occ",
            "sequential_updates_bump_version",
            sequential_updates_bump_version(factory().await).await,
        ),
        TestResult::from_result(
            "occ",
            "stale_entry_update_conflicts",
            stale_entry_update_conflicts(factory().await).await,
        ),
        TestResult::from_result(
            "occ",
            "update_missing_entry_not_found",
            update_missing_entry_not_found(factory().await).await,
        ),
        TestResult::from_result(
            "occ",
            "stale_appointment_update_conflicts",
            stale_appointment_update_conflicts(factory().await).await,
        ),
    ]
}

async fn sequential_updates_bump_version<S: FlowStore>(store: S) -> Result<(), String> {
    let mut entry = make_entry("clinic-a", "e-1", "dr-lee", 1);
    seed_entry(&store, &entry).await?;

    for expected in 0..3 {
        entry.priority = Priority::High;
        let mut snap = store
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let new_version = store
            .update_entry(&mut snap, &entry, expected)
            .await
            .map_err(|e| format!("update at {expected}: {e}"))?;
        store
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit at {expected}: {e}"))?;
        if new_version != expected + 1 {
            return Err(format!(
                "expected version {} after update, got {new_version}",
                expected + 1
            ));
        }
    }

    let read = store
        .get_entry(&TenantId::new("clinic-a"), &EntryId::new("e-1"))
        .await
        .map_err(|e| format!("get: {e}"))?;
    if read.version != 3 {
        return Err(format!("expected stored version 3, got {}", read.version));
    }
    Ok(())
}

async fn stale_entry_update_conflicts<S: FlowStore>(store: S) -> Result<(), String> {
    let entry = make_entry("clinic-a", "e-1", "dr-lee", 1);
    seed_entry(&store, &entry).await?;

    // First writer wins.
    {
        let mut snap = store
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        store
            .update_entry(&mut snap, &entry, 0)
            .await
            .map_err(|e| format!("first update: {e}"))?;
        store
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("first commit: {e}"))?;
    }

    // Second writer still expects version 0 and must conflict, either at
    // staging time or at commit.
    let mut snap = store
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let staged = store.update_entry(&mut snap, &entry, 0).await;
    let outcome = match staged {
        Err(e) => {
            store
                .abort_snapshot(snap)
                .await
                .map_err(|e| format!("abort: {e}"))?;
            Err(e)
        }
        Ok(_) => store.commit_snapshot(snap).await,
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got: {e}")),
        Ok(()) => Err("stale update was accepted".to_string()),
    }
}

async fn update_missing_entry_not_found<S: FlowStore>(store: S) -> Result<(), String> {
    let ghost = make_entry("clinic-a", "ghost", "dr-lee", 1);
    let mut snap = store
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let staged = store.update_entry(&mut snap, &ghost, 0).await;
    let outcome = match staged {
        Err(e) => {
            store
                .abort_snapshot(snap)
                .await
                .map_err(|e| format!("abort: {e}"))?;
            Err(e)
        }
        Ok(_) => store.commit_snapshot(snap).await,
    };
    match outcome {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected EntryNotFound, got: {e}")),
        Ok(()) => Err("update of a missing entry was accepted".to_string()),
    }
}

async fn stale_appointment_update_conflicts<S: FlowStore>(store: S) -> Result<(), String> {
    let appointment = make_appointment("clinic-a", "appt-1", "dr-lee");
    seed_appointment(&store, &appointment).await?;

    {
        let mut snap = store
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        store
            .update_appointment(&mut snap, &appointment, 0)
            .await
            .map_err(|e| format!("first update: {e}"))?;
        store
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("first commit: {e}"))?;
    }

    let mut snap = store
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let staged = store.update_appointment(&mut snap, &appointment, 0).await;
    let outcome = match staged {
        Err(e) => {
            store
                .abort_snapshot(snap)
                .await
                .map_err(|e| format!("abort: {e}"))?;
            Err(e)
        }
        Ok(_) => store.commit_snapshot(snap).await,
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected ConcurrentConflict, got: {e}")),
        Ok(()) => Err("stale appointment update was accepted".to_string()),
    }
}
