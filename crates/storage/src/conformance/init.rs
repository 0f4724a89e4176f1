use std::future::Future;

use careflow_core::{ClinicianId, EntryId, PatientId, TenantId};

use super::{make_appointment, make_entry, seed_appointment, seed_entry, TestResult};
use crate::{FlowStore, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "init",
            "insert_then_get_roundtrip",
            insert_then_get_roundtrip(factory().await).await,
        ),
        TestResult::from_result(
            "init",
            "insert_duplicate_id_rejected",
            insert_duplicate_id_rejected(factory().await).await,
        ),
        TestResult::from_result(
            "init",
            "insert_duplicate_queue_number_rejected",
            insert_duplicate_queue_number_rejected(factory().await).await,
        ),
        TestResult::from_result(
            "init",
            "get_missing_entry_not_found",
            get_missing_entry_not_found(factory().await).await,
        ),
        TestResult::from_result(
            "init",
            "appointment_roundtrip",
            appointment_roundtrip(factory().await).await,
        ),
        TestResult::from_result(
            "init",
            "directory_membership",
            directory_membership(factory().await).await,
        ),
    ]
}

async fn insert_then_get_roundtrip<S: FlowStore>(store: S) -> Result<(), String> {
    let entry = make_entry("clinic-a", "e-1", "dr-lee", 1);
    seed_entry(&store, &entry).await?;

    let read = store
        .get_entry(&TenantId::new("clinic-a"), &EntryId::new("e-1"))
        .await
        .map_err(|e| format!("get: {e}"))?;
    if read != entry {
        return Err("read entry differs from inserted entry".to_string());
    }
    Ok(())
}

async fn insert_duplicate_id_rejected<S: FlowStore>(store: S) -> Result<(), String> {
    seed_entry(&store, &make_entry("clinic-a", "e-1", "dr-lee", 1)).await?;

    // Same id, different queue number.
    let mut dup = make_entry("clinic-a", "e-1", "dr-lee", 2);
    dup.queue_number = careflow_core::QueueNumber::new("20250310-dr-lee-999");
    match seed_entry(&store, &dup).await {
        Err(_) => Ok(()),
        Ok(()) => Err("duplicate entry id was accepted".to_string()),
    }
}

async fn insert_duplicate_queue_number_rejected<S: FlowStore>(store: S) -> Result<(), String> {
    seed_entry(&store, &make_entry("clinic-a", "e-1", "dr-lee", 1)).await?;

    // Different id, same queue number.
    let mut dup = make_entry("clinic-a", "e-2", "dr-lee", 1);
    dup.queue_number = make_entry("clinic-a", "e-1", "dr-lee", 1).queue_number;
    match seed_entry(&store, &dup).await {
        Err(_) => Ok(()),
        Ok(()) => Err("duplicate queue number was accepted".to_string()),
    }
}

async fn get_missing_entry_not_found<S: FlowStore>(store: S) -> Result<(), String> {
    match store
        .get_entry(&TenantId::new("clinic-a"), &EntryId::new("ghost"))
        .await
    {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected EntryNotFound, got: {e}")),
        Ok(_) => Err("expected EntryNotFound, got an entry".to_string()),
    }
}

async fn appointment_roundtrip<S: FlowStore>(store: S) -> Result<(), String> {
    let appointment = make_appointment("clinic-a", "appt-1", "dr-lee");
    seed_appointment(&store, &appointment).await?;

    let read = store
        .get_appointment(
            &TenantId::new("clinic-a"),
            &careflow_core::AppointmentId::new("appt-1"),
        )
        .await
        .map_err(|e| format!("get appointment: {e}"))?;
    if read != appointment {
        return Err("read appointment differs from inserted appointment".to_string());
    }

    match store
        .get_appointment(
            &TenantId::new("clinic-a"),
            &careflow_core::AppointmentId::new("ghost"),
        )
        .await
    {
        Err(StorageError::AppointmentNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected AppointmentNotFound, got: {e}")),
        Ok(_) => Err("expected AppointmentNotFound, got an appointment".to_string()),
    }
}

async fn directory_membership<S: FlowStore>(store: S) -> Result<(), String> {
    let tenant = TenantId::new("clinic-a");
    store
        .register_patient(&tenant, &PatientId::new("p-1"))
        .await
        .map_err(|e| format!("register patient: {e}"))?;
    store
        .register_clinician(&tenant, &ClinicianId::new("dr-lee"))
        .await
        .map_err(|e| format!("register clinician: {e}"))?;

    if !store
        .patient_exists(&tenant, &PatientId::new("p-1"))
        .await
        .map_err(|e| format!("patient_exists: {e}"))?
    {
        return Err("registered patient not found".to_string());
    }
    if store
        .patient_exists(&tenant, &PatientId::new("p-2"))
        .await
        .map_err(|e| format!("patient_exists: {e}"))?
    {
        return Err("unregistered patient reported present".to_string());
    }
    if !store
        .clinician_exists(&tenant, &ClinicianId::new("dr-lee"))
        .await
        .map_err(|e| format!("clinician_exists: {e}"))?
    {
        return Err("registered clinician not found".to_string());
    }
    Ok(())
}
