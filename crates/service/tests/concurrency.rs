//! Races against the service itself: concurrent creations must serialize
//! on the sequence CAS, and concurrent transitions must apply exactly once.

use std::collections::BTreeSet;
use std::sync::Arc;

use time::macros::datetime;

use careflow_core::{ClinicianId, CreateEntryRequest, PatientId, QueueStatus, TenantId};
use careflow_service::{
    ManualClock, QueueService, RequestContext, Role, ServiceConfig, ServiceError,
};
use careflow_storage::{FlowStore, MemoryStore};

const WRITERS: usize = 6;

async fn contended_service() -> (Arc<MemoryStore>, Arc<QueueService<MemoryStore>>) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::starting_at(datetime!(2025-03-10 09:00 UTC)));
    // A deeper retry budget than the default: every loser of a race costs
    // one attempt, and these tests run more writers than the default
    // budget tolerates.
    let config = ServiceConfig {
        max_attempts: WRITERS as u32 + 2,
        ..ServiceConfig::default()
    };
    let service = Arc::new(QueueService::with_config(
        Arc::clone(&store),
        clock,
        config,
    ));

    let tenant = TenantId::new("clinic-a");
    for i in 0..WRITERS {
        store
            .register_patient(&tenant, &PatientId::new(format!("p-{i}")))
            .await
            .unwrap();
    }
    store
        .register_clinician(&tenant, &ClinicianId::new("dr-lee"))
        .await
        .unwrap();

    (store, service)
}

fn ctx() -> RequestContext {
    RequestContext::new("clinic-a", "u-front", Role::FrontDesk)
}

fn walk_in(patient: &str) -> CreateEntryRequest {
    CreateEntryRequest {
        patient_id: patient.to_string(),
        clinician_id: "dr-lee".to_string(),
        kind: "walk_in".to_string(),
        appointment_id: None,
        priority: Some("normal".to_string()),
        reason_for_visit: None,
        notes: None,
    }
}

#[tokio::test]
async fn concurrent_creates_receive_distinct_dense_positions() {
    let (_store, service) = contended_service().await;

    let mut handles = Vec::new();
    for i in 0..WRITERS {
        let s = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            s.create_entry(&walk_in(&format!("p-{i}")), &ctx()).await
        }));
    }

    let mut positions = BTreeSet::new();
    let mut numbers = BTreeSet::new();
    for handle in handles {
        let created = handle.await.unwrap().unwrap().value;
        assert!(
            positions.insert(created.position),
            "duplicate position {} issued",
            created.position
        );
        assert!(
            numbers.insert(created.queue_number.clone()),
            "duplicate queue number {} issued",
            created.queue_number
        );
    }

    // Dense 1..N, no gaps.
    let expected: BTreeSet<u32> = (1..=WRITERS as u32).collect();
    assert_eq!(positions, expected);

    // The committed queue agrees.
    let queue = service
        .doctor_queue(&ClinicianId::new("dr-lee"), false, &ctx())
        .await
        .unwrap();
    let committed: Vec<u32> = queue.iter().map(|e| e.position).collect();
    assert_eq!(committed, (1..=WRITERS as u32).collect::<Vec<_>>());
}

#[tokio::test]
async fn two_concurrent_creates_on_an_empty_queue_take_positions_one_and_two() {
    let (_store, service) = contended_service().await;

    let a = {
        let s = Arc::clone(&service);
        tokio::spawn(async move { s.create_entry(&walk_in("p-0"), &ctx()).await })
    };
    let b = {
        let s = Arc::clone(&service);
        tokio::spawn(async move { s.create_entry(&walk_in("p-1"), &ctx()).await })
    };

    let first = a.await.unwrap().unwrap().value;
    let second = b.await.unwrap().unwrap().value;

    let mut positions = vec![first.position, second.position];
    positions.sort_unstable();
    assert_eq!(positions, vec![1, 2]);
}

#[tokio::test]
async fn a_transition_is_never_applied_twice() {
    let (_store, service) = contended_service().await;
    let entry = service
        .create_entry(&walk_in("p-0"), &ctx())
        .await
        .unwrap()
        .value;

    // Two writers race the same waiting -> in_progress edge. The loser
    // re-reads, finds the entry already in progress, and must be told the
    // transition is invalid rather than silently stamping it again.
    let a = {
        let s = Arc::clone(&service);
        let id = entry.id.clone();
        tokio::spawn(async move {
            s.change_status(&id, QueueStatus::InProgress, None, &ctx())
                .await
        })
    };
    let b = {
        let s = Arc::clone(&service);
        let id = entry.id.clone();
        tokio::spawn(async move {
            s.change_status(&id, QueueStatus::InProgress, None, &ctx())
                .await
        })
    };

    let outcomes = [a.await.unwrap(), b.await.unwrap()];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    let invalid = outcomes
        .iter()
        .filter(|r| matches!(r, Err(ServiceError::InvalidTransition { .. })))
        .count();
    assert_eq!(wins, 1, "exactly one writer must win the edge");
    assert_eq!(invalid, 1, "the loser must see an invalid transition");
}

#[tokio::test]
async fn creates_race_departures_without_position_collisions() {
    let (_store, service) = contended_service().await;

    // Seed a queue of three, then race a departure against two arrivals.
    let mut seeded = Vec::new();
    for i in 0..3 {
        seeded.push(
            service
                .create_entry(&walk_in(&format!("p-{i}")), &ctx())
                .await
                .unwrap()
                .value,
        );
    }

    let departing = seeded[0].id.clone();
    let depart = {
        let s = Arc::clone(&service);
        tokio::spawn(async move {
            s.change_status(&departing, QueueStatus::Skipped, None, &ctx())
                .await
        })
    };
    let arrive_a = {
        let s = Arc::clone(&service);
        tokio::spawn(async move { s.create_entry(&walk_in("p-3"), &ctx()).await })
    };
    let arrive_b = {
        let s = Arc::clone(&service);
        tokio::spawn(async move { s.create_entry(&walk_in("p-4"), &ctx()).await })
    };

    depart.await.unwrap().unwrap();
    arrive_a.await.unwrap().unwrap();
    arrive_b.await.unwrap().unwrap();

    // Whatever the interleaving, committed positions are unique and the
    // read order is strictly increasing.
    let queue = service
        .doctor_queue(&ClinicianId::new("dr-lee"), false, &ctx())
        .await
        .unwrap();
    assert_eq!(queue.len(), 4);
    let positions: Vec<u32> = queue.iter().map(|e| e.position).collect();
    let unique: BTreeSet<u32> = positions.iter().copied().collect();
    assert_eq!(unique.len(), positions.len(), "duplicate positions: {positions:?}");
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
}
