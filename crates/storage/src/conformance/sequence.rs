use std::future::Future;

use careflow_core::{ClinicianId, TenantId};
use time::macros::date;
use time::Date;

use super::TestResult;
use crate::{FlowStore, SequenceKey, StorageError};

pub(super) async fn run_sequence_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "sequence",
            "counter_starts_at_zero",
            counter_starts_at_zero(factory().await).await,
        ),
        TestResult::from_result(
            "sequence",
            "advance_increments_by_one",
            advance_increments_by_one(factory().await).await,
        ),
        TestResult::from_result(
            "sequence",
            "wrong_expected_value_conflicts",
            wrong_expected_value_conflicts(factory().await).await,
        ),
        TestResult::from_result(
            "sequence",
            "distinct_keys_are_independent",
            distinct_keys_are_independent(factory().await).await,
        ),
    ]
}

fn key(tenant: &str, clinician: &str, day: Date) -> SequenceKey {
    SequenceKey {
        tenant_id: TenantId::new(tenant),
        clinician_id: ClinicianId::new(clinician),
        day,
    }
}

async fn advance_committed<S: FlowStore>(
    store: &S,
    key: &SequenceKey,
    expected: u64,
) -> Result<u64, StorageError> {
    let mut snap = store.begin_snapshot().await?;
    let value = match store.advance_sequence(&mut snap, key, expected).await {
        Ok(v) => v,
        Err(e) => {
            store.abort_snapshot(snap).await?;
            return Err(e);
        }
    };
    store.commit_snapshot(snap).await?;
    Ok(value)
}

async fn counter_starts_at_zero<S: FlowStore>(store: S) -> Result<(), String> {
    let k = key("clinic-a", "dr-lee", date!(2025 - 03 - 10));
    let value = store
        .read_sequence(&k)
        .await
        .map_err(|e| format!("read: {e}"))?;
    if value != 0 {
        return Err(format!("fresh counter read {value}, expected 0"));
    }
    Ok(())
}

async fn advance_increments_by_one<S: FlowStore>(store: S) -> Result<(), String> {
    let k = key("clinic-a", "dr-lee", date!(2025 - 03 - 10));
    for expected in 0..5u64 {
        let value = advance_committed(&store, &k, expected)
            .await
            .map_err(|e| format!("advance from {expected}: {e}"))?;
        if value != expected + 1 {
            return Err(format!(
                "advance from {expected} returned {value}, expected {}",
                expected + 1
            ));
        }
    }
    let read = store
        .read_sequence(&k)
        .await
        .map_err(|e| format!("read: {e}"))?;
    if read != 5 {
        return Err(format!("counter read {read} after 5 advances"));
    }
    Ok(())
}

async fn wrong_expected_value_conflicts<S: FlowStore>(store: S) -> Result<(), String> {
    let k = key("clinic-a", "dr-lee", date!(2025 - 03 - 10));
    advance_committed(&store, &k, 0)
        .await
        .map_err(|e| format!("first advance: {e}"))?;

    match advance_committed(&store, &k, 0).await {
        Err(StorageError::SequenceConflict { .. }) => Ok(()),
        Err(e) => Err(format!("expected SequenceConflict, got: {e}")),
        Ok(v) => Err(format!("stale advance succeeded with value {v}")),
    }
}

async fn distinct_keys_are_independent<S: FlowStore>(store: S) -> Result<(), String> {
    let monday_lee = key("clinic-a", "dr-lee", date!(2025 - 03 - 10));
    let monday_patel = key("clinic-a", "dr-patel", date!(2025 - 03 - 10));
    let tuesday_lee = key("clinic-a", "dr-lee", date!(2025 - 03 - 11));
    let other_tenant = key("clinic-b", "dr-lee", date!(2025 - 03 - 10));

    advance_committed(&store, &monday_lee, 0)
        .await
        .map_err(|e| format!("advance: {e}"))?;
    advance_committed(&store, &monday_lee, 1)
        .await
        .map_err(|e| format!("advance: {e}"))?;

    for (name, k) in [
        ("same day, other clinician", &monday_patel),
        ("same clinician, next day", &tuesday_lee),
        ("other tenant", &other_tenant),
    ] {
        let value = store
            .read_sequence(k)
            .await
            .map_err(|e| format!("read: {e}"))?;
        if value != 0 {
            return Err(format!("{name}: counter read {value}, expected 0"));
        }
    }
    Ok(())
}
