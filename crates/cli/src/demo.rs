//! `careflow demo` -- a scripted clinic morning against an in-memory
//! store, printing the queue as it evolves.

use std::error::Error;
use std::sync::Arc;

use careflow_core::{
    Appointment, AppointmentId, AppointmentStatus, ClinicianId, CreateEntryRequest, PatientId,
    QueueStatus, TenantId,
};
use careflow_service::{QueueService, RequestContext, Role, SystemClock};
use careflow_storage::{FlowStore, MemoryStore};
use time::{Duration, OffsetDateTime};

const TENANT: &str = "demo-clinic";
const CLINICIAN: &str = "dr-lee";

pub async fn run() -> Result<(), Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let service = QueueService::new(Arc::clone(&store), Arc::new(SystemClock));
    let ctx = RequestContext::new(TENANT, "front-desk-1", Role::FrontDesk);
    let tenant = TenantId::new(TENANT);

    // Seed the directory and one scheduled appointment.
    for patient in ["alice", "bashir", "carol", "diego"] {
        store.register_patient(&tenant, &PatientId::new(patient)).await?;
    }
    store
        .register_clinician(&tenant, &ClinicianId::new(CLINICIAN))
        .await?;

    let now = OffsetDateTime::now_utc();
    let appointment = Appointment {
        id: AppointmentId::new("appt-alice"),
        tenant_id: tenant.clone(),
        patient_id: PatientId::new("alice"),
        clinician_id: ClinicianId::new(CLINICIAN),
        scheduled_start: now + Duration::minutes(30),
        scheduled_end: now + Duration::minutes(60),
        status: AppointmentStatus::Scheduled,
        arrived_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        cancel_reason: None,
        version: 0,
    };
    let mut snapshot = store.begin_snapshot().await?;
    store.insert_appointment(&mut snapshot, &appointment).await?;
    store.commit_snapshot(snapshot).await?;

    println!("== A morning at {TENANT} ==\n");

    // Alice checks in for her appointment; two walk-ins follow; then an
    // urgent case comes through the door.
    let alice = service
        .create_entry(
            &entry_request("alice", "appointment", Some("appt-alice"), "normal"),
            &ctx,
        )
        .await?
        .value;
    service
        .create_entry(&entry_request("bashir", "walk_in", None, "normal"), &ctx)
        .await?;
    service
        .create_entry(&entry_request("carol", "walk_in", None, "normal"), &ctx)
        .await?;
    service
        .create_entry(&entry_request("diego", "walk_in", None, "urgent"), &ctx)
        .await?;

    print_queue(&service, &ctx, "after check-ins (urgent case jumps the line)").await?;

    // Alice is called in directly and seen.
    service
        .change_status(&alice.id, QueueStatus::InProgress, None, &ctx)
        .await?;
    print_queue(&service, &ctx, "alice in consultation").await?;

    service
        .change_status(&alice.id, QueueStatus::Completed, None, &ctx)
        .await?;

    let appointment = store
        .get_appointment(&tenant, &AppointmentId::new("appt-alice"))
        .await?;
    println!(
        "alice's appointment cascaded to: {}\n",
        appointment.status
    );

    let stats = service.statistics(&ClinicianId::new(CLINICIAN), &ctx).await?;
    println!("day statistics:\n{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

fn entry_request(
    patient: &str,
    kind: &str,
    appointment_id: Option<&str>,
    priority: &str,
) -> CreateEntryRequest {
    CreateEntryRequest {
        patient_id: patient.to_string(),
        clinician_id: CLINICIAN.to_string(),
        kind: kind.to_string(),
        appointment_id: appointment_id.map(str::to_string),
        priority: Some(priority.to_string()),
        reason_for_visit: None,
        notes: None,
    }
}

async fn print_queue(
    service: &QueueService<MemoryStore>,
    ctx: &RequestContext,
    label: &str,
) -> Result<(), Box<dyn Error>> {
    let entries = service
        .doctor_queue(&ClinicianId::new(CLINICIAN), true, ctx)
        .await?;
    println!("-- {label} --");
    for entry in entries {
        println!(
            "  #{:<2} {:<8} {:<12} {} (est. wait {} min)",
            entry.position,
            entry.patient_id.to_string(),
            entry.status.to_string(),
            entry.queue_number,
            entry.estimated_wait_minutes.unwrap_or(0),
        );
    }
    println!();
    Ok(())
}
