//! End-to-end tests of the queue service over the in-memory store,
//! driven by a manual clock so every timestamp is reproducible.

use std::sync::Arc;

use time::macros::datetime;
use time::Duration;

use careflow_core::{
    Appointment, AppointmentId, AppointmentStatus, ClinicianId, CreateEntryRequest, EntryId,
    EntryKind, Lifecycle, PatientId, Priority, QueueEntry, QueueNumber, QueueStatus, TenantId,
};
use careflow_service::{
    ManualClock, QueueService, RequestContext, Role, ServiceError, ServiceWarning,
};
use careflow_storage::{EntryFilter, FlowStore, MemoryStore, Page};

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    service: QueueService<MemoryStore>,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::starting_at(datetime!(2025-03-10 09:00 UTC)));
    let service = QueueService::new(Arc::clone(&store), clock.clone());

    let tenant = TenantId::new("clinic-a");
    for patient in ["p-1", "p-2", "p-3", "p-4"] {
        store
            .register_patient(&tenant, &PatientId::new(patient))
            .await
            .unwrap();
    }
    for clinician in ["dr-lee", "dr-patel"] {
        store
            .register_clinician(&tenant, &ClinicianId::new(clinician))
            .await
            .unwrap();
    }

    Fixture {
        store,
        clock,
        service,
    }
}

fn ctx() -> RequestContext {
    RequestContext::new("clinic-a", "u-front", Role::FrontDesk)
}

fn walk_in(patient: &str, clinician: &str, priority: &str) -> CreateEntryRequest {
    CreateEntryRequest {
        patient_id: patient.to_string(),
        clinician_id: clinician.to_string(),
        kind: "walk_in".to_string(),
        appointment_id: None,
        priority: Some(priority.to_string()),
        reason_for_visit: None,
        notes: None,
    }
}

fn from_appointment(patient: &str, clinician: &str, appointment: &str) -> CreateEntryRequest {
    CreateEntryRequest {
        patient_id: patient.to_string(),
        clinician_id: clinician.to_string(),
        kind: "appointment".to_string(),
        appointment_id: Some(appointment.to_string()),
        priority: None,
        reason_for_visit: None,
        notes: None,
    }
}

async fn seed_appointment(store: &MemoryStore, id: &str, patient: &str, clinician: &str) {
    let appointment = Appointment {
        id: AppointmentId::new(id),
        tenant_id: TenantId::new("clinic-a"),
        patient_id: PatientId::new(patient),
        clinician_id: ClinicianId::new(clinician),
        scheduled_start: datetime!(2025-03-10 09:30 UTC),
        scheduled_end: datetime!(2025-03-10 10:00 UTC),
        status: AppointmentStatus::Scheduled,
        arrived_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        cancel_reason: None,
        version: 0,
    };
    let mut snap = store.begin_snapshot().await.unwrap();
    store.insert_appointment(&mut snap, &appointment).await.unwrap();
    store.commit_snapshot(snap).await.unwrap();
}

async fn positions(service: &QueueService<MemoryStore>, clinician: &str) -> Vec<(String, u32)> {
    service
        .doctor_queue(&ClinicianId::new(clinician), false, &ctx())
        .await
        .unwrap()
        .into_iter()
        .map(|e| (e.patient_id.to_string(), e.position))
        .collect()
}

// ── Creation and natural ordering ───────────────────────────────────────

#[tokio::test]
async fn walk_in_appends_behind_existing_waiting_entries() {
    let f = fixture().await;
    f.service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap();
    f.clock.advance(Duration::minutes(2));
    f.service
        .create_entry(&walk_in("p-2", "dr-lee", "normal"), &ctx())
        .await
        .unwrap();
    f.clock.advance(Duration::minutes(2));

    let third = f
        .service
        .create_entry(&walk_in("p-3", "dr-lee", "normal"), &ctx())
        .await
        .unwrap()
        .value;
    assert_eq!(third.position, 3);
    assert_eq!(third.status, QueueStatus::Waiting);

    assert_eq!(
        positions(&f.service, "dr-lee").await,
        vec![
            ("p-1".to_string(), 1),
            ("p-2".to_string(), 2),
            ("p-3".to_string(), 3)
        ]
    );
}

#[tokio::test]
async fn urgent_arrival_jumps_ahead_and_shifts_the_rest() {
    let f = fixture().await;
    f.service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap();
    f.clock.advance(Duration::minutes(2));
    f.service
        .create_entry(&walk_in("p-2", "dr-lee", "normal"), &ctx())
        .await
        .unwrap();
    f.clock.advance(Duration::minutes(2));

    let urgent = f
        .service
        .create_entry(&walk_in("p-3", "dr-lee", "urgent"), &ctx())
        .await
        .unwrap()
        .value;
    assert_eq!(urgent.position, 1);

    assert_eq!(
        positions(&f.service, "dr-lee").await,
        vec![
            ("p-3".to_string(), 1),
            ("p-1".to_string(), 2),
            ("p-2".to_string(), 3)
        ]
    );
}

#[tokio::test]
async fn queue_numbers_embed_the_day_and_count_up() {
    let f = fixture().await;
    let first = f
        .service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap()
        .value;
    let second = f
        .service
        .create_entry(&walk_in("p-2", "dr-lee", "normal"), &ctx())
        .await
        .unwrap()
        .value;
    assert_eq!(first.queue_number, QueueNumber::new("20250310-dr-lee-001"));
    assert_eq!(second.queue_number, QueueNumber::new("20250310-dr-lee-002"));

    // Another clinician's counter is independent.
    let other = f
        .service
        .create_entry(&walk_in("p-3", "dr-patel", "normal"), &ctx())
        .await
        .unwrap()
        .value;
    assert_eq!(other.queue_number, QueueNumber::new("20250310-dr-patel-001"));
    assert_eq!(other.position, 1);
}

#[tokio::test]
async fn queues_are_scoped_per_clinician() {
    let f = fixture().await;
    f.service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap();
    f.service
        .create_entry(&walk_in("p-2", "dr-patel", "normal"), &ctx())
        .await
        .unwrap();

    assert_eq!(positions(&f.service, "dr-lee").await.len(), 1);
    assert_eq!(positions(&f.service, "dr-patel").await.len(), 1);
}

#[tokio::test]
async fn estimated_wait_scales_with_position() {
    let f = fixture().await;
    for patient in ["p-1", "p-2", "p-3"] {
        f.service
            .create_entry(&walk_in(patient, "dr-lee", "normal"), &ctx())
            .await
            .unwrap();
    }
    let queue = f
        .service
        .doctor_queue(&ClinicianId::new("dr-lee"), false, &ctx())
        .await
        .unwrap();
    let waits: Vec<Option<i64>> = queue.iter().map(|e| e.estimated_wait_minutes).collect();
    assert_eq!(waits, vec![Some(0), Some(15), Some(30)]);
}

// ── Input and reference validation ──────────────────────────────────────

#[tokio::test]
async fn malformed_input_reports_every_field() {
    let f = fixture().await;
    let request = CreateEntryRequest {
        patient_id: String::new(),
        clinician_id: "dr-lee".to_string(),
        kind: "walk_in".to_string(),
        appointment_id: None,
        priority: Some("asap".to_string()),
        reason_for_visit: None,
        notes: None,
    };
    let err = f.service.create_entry(&request, &ctx()).await.unwrap_err();
    match err {
        ServiceError::Validation(v) => {
            let fields: Vec<&str> = v.errors.iter().map(|e| e.field.as_str()).collect();
            assert_eq!(fields, vec!["patient_id", "priority"]);
        }
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_participants_are_not_found() {
    let f = fixture().await;
    let err = f
        .service
        .create_entry(&walk_in("p-unknown", "dr-lee", "normal"), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { kind: "patient", .. }));

    let err = f
        .service
        .create_entry(&walk_in("p-1", "dr-nobody", "normal"), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotFound {
            kind: "clinician",
            ..
        }
    ));
}

#[tokio::test]
async fn appointment_link_must_match_patient_and_clinician() {
    let f = fixture().await;
    seed_appointment(&f.store, "appt-1", "p-1", "dr-lee").await;

    let err = f
        .service
        .create_entry(&from_appointment("p-2", "dr-lee", "appt-1"), &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn second_active_link_to_an_appointment_conflicts() {
    let f = fixture().await;
    seed_appointment(&f.store, "appt-1", "p-1", "dr-lee").await;

    let first = f
        .service
        .create_entry(&from_appointment("p-1", "dr-lee", "appt-1"), &ctx())
        .await
        .unwrap()
        .value;

    let err = f
        .service
        .create_entry(&from_appointment("p-1", "dr-lee", "appt-1"), &ctx())
        .await
        .unwrap_err();
    match err {
        ServiceError::DuplicateLink {
            appointment_id,
            entry_id,
        } => {
            assert_eq!(appointment_id, AppointmentId::new("appt-1"));
            assert_eq!(entry_id, first.id);
        }
        other => panic!("expected DuplicateLink, got {other:?}"),
    }

    // Once the first entry reaches a terminal state the appointment can
    // be linked again (e.g. a re-check-in after a skip).
    f.service
        .change_status(&first.id, QueueStatus::Skipped, None, &ctx())
        .await
        .unwrap();
    f.service
        .create_entry(&from_appointment("p-1", "dr-lee", "appt-1"), &ctx())
        .await
        .unwrap();
}

// ── Status transitions and cascades ─────────────────────────────────────

#[tokio::test]
async fn check_in_cascades_the_appointment_into_the_queue() {
    let f = fixture().await;
    seed_appointment(&f.store, "appt-1", "p-1", "dr-lee").await;

    f.service
        .create_entry(&from_appointment("p-1", "dr-lee", "appt-1"), &ctx())
        .await
        .unwrap();

    let appointment = f
        .store
        .get_appointment(&TenantId::new("clinic-a"), &AppointmentId::new("appt-1"))
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::InQueue);
    assert_eq!(
        appointment.arrived_at,
        Some(datetime!(2025-03-10 09:00 UTC))
    );
}

#[tokio::test]
async fn direct_call_in_starts_the_consultation() {
    let f = fixture().await;
    seed_appointment(&f.store, "appt-1", "p-1", "dr-lee").await;
    let entry = f
        .service
        .create_entry(&from_appointment("p-1", "dr-lee", "appt-1"), &ctx())
        .await
        .unwrap()
        .value;

    f.clock.advance(Duration::minutes(12));
    let updated = f
        .service
        .change_status(&entry.id, QueueStatus::InProgress, None, &ctx())
        .await
        .unwrap()
        .value;
    assert_eq!(updated.status, QueueStatus::InProgress);
    assert_eq!(updated.started_at, Some(datetime!(2025-03-10 09:12 UTC)));

    let appointment = f
        .store
        .get_appointment(&TenantId::new("clinic-a"), &AppointmentId::new("appt-1"))
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::InProgress);
    assert_eq!(
        appointment.started_at,
        Some(datetime!(2025-03-10 09:12 UTC))
    );
}

#[tokio::test]
async fn completion_derives_wait_and_completes_the_appointment() {
    let f = fixture().await;
    seed_appointment(&f.store, "appt-1", "p-1", "dr-lee").await;
    let entry = f
        .service
        .create_entry(&from_appointment("p-1", "dr-lee", "appt-1"), &ctx())
        .await
        .unwrap()
        .value;

    f.clock.advance(Duration::minutes(10));
    f.service
        .change_status(&entry.id, QueueStatus::InProgress, None, &ctx())
        .await
        .unwrap();
    f.clock.advance(Duration::minutes(15));
    let completed = f
        .service
        .change_status(&entry.id, QueueStatus::Completed, None, &ctx())
        .await
        .unwrap()
        .value;

    assert_eq!(completed.actual_wait_minutes, Some(10));
    assert_eq!(
        completed.completed_at,
        Some(datetime!(2025-03-10 09:25 UTC))
    );

    let appointment = f
        .store
        .get_appointment(&TenantId::new("clinic-a"), &AppointmentId::new("appt-1"))
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Completed);
    assert_eq!(
        appointment.completed_at,
        Some(datetime!(2025-03-10 09:25 UTC))
    );
}

#[tokio::test]
async fn cancellation_copies_the_reason_to_the_appointment() {
    let f = fixture().await;
    seed_appointment(&f.store, "appt-1", "p-1", "dr-lee").await;
    let entry = f
        .service
        .create_entry(&from_appointment("p-1", "dr-lee", "appt-1"), &ctx())
        .await
        .unwrap()
        .value;

    f.service
        .change_status(
            &entry.id,
            QueueStatus::Cancelled,
            Some("patient left".to_string()),
            &ctx(),
        )
        .await
        .unwrap();

    let appointment = f
        .store
        .get_appointment(&TenantId::new("clinic-a"), &AppointmentId::new("appt-1"))
        .await
        .unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Cancelled);
    assert_eq!(appointment.cancel_reason.as_deref(), Some("patient left"));
}

#[tokio::test]
async fn transitions_out_of_terminal_states_are_rejected() {
    let f = fixture().await;
    let entry = f
        .service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap()
        .value;
    f.service
        .change_status(&entry.id, QueueStatus::InProgress, None, &ctx())
        .await
        .unwrap();
    f.service
        .change_status(&entry.id, QueueStatus::Completed, None, &ctx())
        .await
        .unwrap();

    let err = f
        .service
        .change_status(&entry.id, QueueStatus::Waiting, None, &ctx())
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidTransition { from, to } => {
            assert_eq!(from, QueueStatus::Completed);
            assert_eq!(to, QueueStatus::Waiting);
        }
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[tokio::test]
async fn leaving_the_waiting_set_renormalizes_positions() {
    let f = fixture().await;
    for patient in ["p-1", "p-2", "p-3"] {
        f.service
            .create_entry(&walk_in(patient, "dr-lee", "normal"), &ctx())
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(1));
    }
    let queue = f
        .service
        .doctor_queue(&ClinicianId::new("dr-lee"), false, &ctx())
        .await
        .unwrap();
    let front = queue[0].clone();

    f.service
        .change_status(&front.id, QueueStatus::Called, None, &ctx())
        .await
        .unwrap();

    assert_eq!(
        positions(&f.service, "dr-lee").await,
        vec![("p-2".to_string(), 1), ("p-3".to_string(), 2)]
    );

    // The called entry shows up only when in-consult entries are included.
    let with_consult = f
        .service
        .doctor_queue(&ClinicianId::new("dr-lee"), true, &ctx())
        .await
        .unwrap();
    assert_eq!(with_consult.len(), 3);
    assert_eq!(with_consult[2].id, front.id);
    assert_eq!(with_consult[2].status, QueueStatus::Called);
}

#[tokio::test]
async fn orphaned_appointment_link_warns_without_blocking() {
    let f = fixture().await;

    // Corrupted state: an entry whose appointment link resolves nowhere.
    // The transition must stand and surface a warning for remediation.
    let entry = QueueEntry {
        id: EntryId::new("orphan-e"),
        tenant_id: TenantId::new("clinic-a"),
        queue_number: QueueNumber::new("20250310-dr-lee-900"),
        kind: EntryKind::Appointment {
            appointment_id: AppointmentId::new("appt-ghost"),
        },
        patient_id: PatientId::new("p-1"),
        clinician_id: ClinicianId::new("dr-lee"),
        priority: Priority::Normal,
        position: 1,
        status: QueueStatus::Waiting,
        joined_at: datetime!(2025-03-10 08:45 UTC),
        called_at: None,
        called_by: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        cancel_reason: None,
        actual_wait_minutes: None,
        estimated_wait_minutes: None,
        reason_for_visit: None,
        notes: None,
        lifecycle: Lifecycle::Active,
        version: 0,
    };
    let mut snap = f.store.begin_snapshot().await.unwrap();
    f.store.insert_entry(&mut snap, &entry).await.unwrap();
    f.store.commit_snapshot(snap).await.unwrap();

    let result = f
        .service
        .change_status(&entry.id, QueueStatus::InProgress, None, &ctx())
        .await
        .unwrap();
    assert_eq!(result.value.status, QueueStatus::InProgress);
    assert_eq!(result.warnings.len(), 1);
    assert!(matches!(
        result.warnings[0],
        ServiceWarning::OrphanedQueueLink { .. }
    ));
}

// ── Reorder ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn reorder_assigns_positions_in_the_given_order() {
    let f = fixture().await;
    let mut ids = Vec::new();
    for patient in ["p-1", "p-2", "p-3"] {
        ids.push(
            f.service
                .create_entry(&walk_in(patient, "dr-lee", "normal"), &ctx())
                .await
                .unwrap()
                .value
                .id,
        );
        f.clock.advance(Duration::minutes(1));
    }
    let (a, b, c) = (ids[0].clone(), ids[1].clone(), ids[2].clone());

    let reordered = f
        .service
        .reorder(
            &ClinicianId::new("dr-lee"),
            &[c.clone(), a.clone(), b.clone()],
            &ctx(),
        )
        .await
        .unwrap();
    let order: Vec<(String, u32)> = reordered
        .iter()
        .map(|e| (e.patient_id.to_string(), e.position))
        .collect();
    assert_eq!(
        order,
        vec![
            ("p-3".to_string(), 1),
            ("p-1".to_string(), 2),
            ("p-2".to_string(), 3)
        ]
    );
}

#[tokio::test]
async fn reorder_with_a_stale_set_changes_nothing() {
    let f = fixture().await;
    let mut ids = Vec::new();
    for patient in ["p-1", "p-2", "p-3"] {
        ids.push(
            f.service
                .create_entry(&walk_in(patient, "dr-lee", "normal"), &ctx())
                .await
                .unwrap()
                .value
                .id,
        );
    }

    let err = f
        .service
        .reorder(
            &ClinicianId::new("dr-lee"),
            &[ids[0].clone(), ids[1].clone()],
            &ctx(),
        )
        .await
        .unwrap_err();
    match err {
        ServiceError::InvalidReorderSet {
            unexpected,
            missing,
        } => {
            assert!(unexpected.is_empty());
            assert_eq!(missing, vec![ids[2].clone()]);
        }
        other => panic!("expected InvalidReorderSet, got {other:?}"),
    }

    // Nothing moved.
    assert_eq!(
        positions(&f.service, "dr-lee").await,
        vec![
            ("p-1".to_string(), 1),
            ("p-2".to_string(), 2),
            ("p-3".to_string(), 3)
        ]
    );
}

#[tokio::test]
async fn manual_order_survives_a_departure() {
    let f = fixture().await;
    let mut ids = Vec::new();
    for patient in ["p-1", "p-2", "p-3"] {
        ids.push(
            f.service
                .create_entry(&walk_in(patient, "dr-lee", "normal"), &ctx())
                .await
                .unwrap()
                .value
                .id,
        );
        f.clock.advance(Duration::minutes(1));
    }

    // Manual order p-3, p-1, p-2; then p-3 is called away.
    f.service
        .reorder(
            &ClinicianId::new("dr-lee"),
            &[ids[2].clone(), ids[0].clone(), ids[1].clone()],
            &ctx(),
        )
        .await
        .unwrap();
    f.service
        .change_status(&ids[2], QueueStatus::Called, None, &ctx())
        .await
        .unwrap();

    // Compaction keeps the manual relative order p-1 before p-2.
    assert_eq!(
        positions(&f.service, "dr-lee").await,
        vec![("p-1".to_string(), 1), ("p-2".to_string(), 2)]
    );
}

// ── Tenant scoping and soft lifecycle ───────────────────────────────────

#[tokio::test]
async fn foreign_tenants_see_nothing() {
    let f = fixture().await;
    let entry = f
        .service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap()
        .value;

    let foreign = RequestContext::new("clinic-b", "u-other", Role::Admin);
    let err = f
        .service
        .change_status(&entry.id, QueueStatus::Called, None, &foreign)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));

    let listing = f
        .service
        .list_entries(&EntryFilter::default(), &Page::default(), &foreign)
        .await
        .unwrap();
    assert_eq!(listing.total, 0);
}

#[tokio::test]
async fn soft_delete_hides_the_entry_and_compacts_the_queue() {
    let f = fixture().await;
    let first = f
        .service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap()
        .value;
    f.service
        .create_entry(&walk_in("p-2", "dr-lee", "normal"), &ctx())
        .await
        .unwrap();

    let removed = f.service.remove_entry(&first.id, &ctx()).await.unwrap();
    assert!(matches!(removed.lifecycle, Lifecycle::Deleted { .. }));

    assert_eq!(
        positions(&f.service, "dr-lee").await,
        vec![("p-2".to_string(), 1)]
    );

    // Gone from listings and from further operations, but still on record.
    let listing = f
        .service
        .list_entries(&EntryFilter::default(), &Page::default(), &ctx())
        .await
        .unwrap();
    assert_eq!(listing.total, 1);

    let err = f
        .service
        .change_status(&first.id, QueueStatus::Called, None, &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));

    let audit = f
        .store
        .get_entry(&TenantId::new("clinic-a"), &first.id)
        .await
        .unwrap();
    assert!(matches!(audit.lifecycle, Lifecycle::Deleted { .. }));
}

// ── Listing and statistics ──────────────────────────────────────────────

#[tokio::test]
async fn listing_filters_and_paginates() {
    let f = fixture().await;
    f.service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap();
    f.service
        .create_entry(&walk_in("p-2", "dr-lee", "urgent"), &ctx())
        .await
        .unwrap();
    f.service
        .create_entry(&walk_in("p-3", "dr-patel", "normal"), &ctx())
        .await
        .unwrap();

    let urgent_only = f
        .service
        .list_entries(
            &EntryFilter {
                priority: Some(Priority::Urgent),
                ..EntryFilter::default()
            },
            &Page::default(),
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(urgent_only.total, 1);
    assert_eq!(urgent_only.items[0].patient_id, PatientId::new("p-2"));

    let by_clinician = f
        .service
        .list_entries(
            &EntryFilter {
                clinician_id: Some(ClinicianId::new("dr-lee")),
                ..EntryFilter::default()
            },
            &Page::default(),
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(by_clinician.total, 2);

    let page_two = f
        .service
        .list_entries(
            &EntryFilter::default(),
            &Page {
                page: 2,
                per_page: 2,
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(page_two.total, 3);
    assert_eq!(page_two.items.len(), 1);
}

#[tokio::test]
async fn statistics_summarize_the_current_day() {
    let f = fixture().await;
    let entry = f
        .service
        .create_entry(&walk_in("p-1", "dr-lee", "normal"), &ctx())
        .await
        .unwrap()
        .value;
    f.service
        .create_entry(&walk_in("p-2", "dr-lee", "urgent"), &ctx())
        .await
        .unwrap();
    f.service
        .create_entry(&walk_in("p-3", "dr-lee", "normal"), &ctx())
        .await
        .unwrap();

    f.clock.advance(Duration::minutes(8));
    f.service
        .change_status(&entry.id, QueueStatus::InProgress, None, &ctx())
        .await
        .unwrap();
    f.clock.advance(Duration::minutes(10));
    f.service
        .change_status(&entry.id, QueueStatus::Completed, None, &ctx())
        .await
        .unwrap();

    let stats = f
        .service
        .statistics(&ClinicianId::new("dr-lee"), &ctx())
        .await
        .unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.waiting, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.by_priority[&Priority::Urgent], 1);
    assert_eq!(stats.average_wait_minutes, Some(8.0));
}

#[tokio::test]
async fn doctor_queue_reads_are_idempotent() {
    let f = fixture().await;
    for patient in ["p-1", "p-2", "p-3"] {
        f.service
            .create_entry(&walk_in(patient, "dr-lee", "normal"), &ctx())
            .await
            .unwrap();
        f.clock.advance(Duration::minutes(1));
    }

    let first = positions(&f.service, "dr-lee").await;
    let second = positions(&f.service, "dr-lee").await;
    assert_eq!(first, second);
}
