use std::future::Future;
use std::sync::Arc;

use careflow_core::{ClinicianId, Priority, TenantId};
use time::macros::date;

use super::{make_entry, seed_entry, TestResult};
use crate::{FlowStore, SequenceKey, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_entry_updates_exactly_one_wins",
            concurrent_entry_updates_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_sequence_advances_exactly_one_wins",
            concurrent_sequence_advances_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_inserts_same_id_exactly_one_wins",
            concurrent_inserts_same_id_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_updates_different_entries_all_succeed",
            concurrent_updates_different_entries_all_succeed(factory).await,
        ),
    ]
}

/// N tasks race to update the same entry from version 0. Exactly one
/// commit succeeds; the rest must observe a conflict at staging or commit.
async fn concurrent_entry_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let entry = make_entry("clinic-a", "e-1", "dr-lee", 1);
    seed_entry(store.as_ref(), &entry).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = Arc::clone(&store);
        let mut updated = entry.clone();
        handles.push(tokio::spawn(async move {
            updated.priority = if i % 2 == 0 {
                Priority::High
            } else {
                Priority::Urgent
            };
            let mut snap = s.begin_snapshot().await?;
            match s.update_entry(&mut snap, &updated, 0).await {
                Ok(_) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(e) if e.is_retryable() => Ok(false),
                    Err(e) => Err(e),
                },
                Err(e) if e.is_retryable() => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }

    let read = store
        .get_entry(&TenantId::new("clinic-a"), &entry.id)
        .await
        .map_err(|e| format!("get: {e}"))?;
    if read.version != 1 {
        return Err(format!(
            "expected version 1 after a single winning update, got {}",
            read.version
        ));
    }
    Ok(())
}

/// N tasks race the same sequence counter from 0. Exactly one advance
/// commits; the counter ends at 1.
async fn concurrent_sequence_advances_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let key = SequenceKey {
        tenant_id: TenantId::new("clinic-a"),
        clinician_id: ClinicianId::new("dr-lee"),
        day: date!(2025 - 03 - 10),
    };

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = Arc::clone(&store);
        let k = key.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            match s.advance_sequence(&mut snap, &k, 0).await {
                Ok(_) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(e) if e.is_retryable() => Ok(false),
                    Err(e) => Err(e),
                },
                Err(e) if e.is_retryable() => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }

    let value = store
        .read_sequence(&key)
        .await
        .map_err(|e| format!("read: {e}"))?;
    if value != 1 {
        return Err(format!("counter read {value} after the race, expected 1"));
    }
    Ok(())
}

/// N tasks race to insert the same entry id. Exactly one wins.
async fn concurrent_inserts_same_id_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            // Distinct queue numbers so only the id collides.
            let mut entry = make_entry("clinic-a", "e-1", "dr-lee", 1);
            entry.queue_number =
                careflow_core::QueueNumber::new(format!("20250310-dr-lee-r{i:03}"));
            let mut snap = s.begin_snapshot().await?;
            match s.insert_entry(&mut snap, &entry).await {
                Ok(()) => match s.commit_snapshot(snap).await {
                    Ok(()) => Ok(true),
                    Err(StorageError::AlreadyExists { .. }) => Ok(false),
                    Err(e) => Err(e),
                },
                Err(StorageError::AlreadyExists { .. }) => {
                    s.abort_snapshot(snap).await?;
                    Ok(false)
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

/// N tasks each update a different entry. No false conflicts.
async fn concurrent_updates_different_entries_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    for i in 0..N {
        seed_entry(
            store.as_ref(),
            &make_entry("clinic-a", &format!("e-{i}"), "dr-lee", i as u32 + 1),
        )
        .await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        let s = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut entry = make_entry("clinic-a", &format!("e-{i}"), "dr-lee", i as u32 + 1);
            entry.priority = Priority::High;
            let mut snap = s.begin_snapshot().await?;
            s.update_entry(&mut snap, &entry, 0).await?;
            s.commit_snapshot(snap).await?;
            Ok::<(), StorageError>(())
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
    }

    for i in 0..N {
        let read = store
            .get_entry(
                &TenantId::new("clinic-a"),
                &careflow_core::EntryId::new(format!("e-{i}")),
            )
            .await
            .map_err(|e| format!("get e-{i}: {e}"))?;
        if read.priority != Priority::High || read.version != 1 {
            return Err(format!(
                "e-{i}: expected High/version 1, got {:?}/{}",
                read.priority, read.version
            ));
        }
    }
    Ok(())
}
