use std::future::Future;

use careflow_core::{AppointmentId, ClinicianId, EntryId, TenantId};

use super::{make_appointment, make_entry, seed_appointment, seed_entry, TestResult};
use crate::{EntryFilter, FlowStore, Page, StorageError};

pub(super) async fn run_tenant_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "tenant",
            "entry_reads_are_tenant_scoped",
            entry_reads_are_tenant_scoped(factory().await).await,
        ),
        TestResult::from_result(
            "tenant",
            "queue_queries_are_tenant_scoped",
            queue_queries_are_tenant_scoped(factory().await).await,
        ),
        TestResult::from_result(
            "tenant",
            "appointment_reads_are_tenant_scoped",
            appointment_reads_are_tenant_scoped(factory().await).await,
        ),
    ]
}

async fn entry_reads_are_tenant_scoped<S: FlowStore>(store: S) -> Result<(), String> {
    seed_entry(&store, &make_entry("clinic-a", "e-1", "dr-lee", 1)).await?;

    // The same entry id through another tenant is absence, not exposure.
    match store
        .get_entry(&TenantId::new("clinic-b"), &EntryId::new("e-1"))
        .await
    {
        Err(StorageError::EntryNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected EntryNotFound, got: {e}")),
        Ok(_) => Err("entry leaked across tenants".to_string()),
    }
}

async fn queue_queries_are_tenant_scoped<S: FlowStore>(store: S) -> Result<(), String> {
    seed_entry(&store, &make_entry("clinic-a", "e-1", "dr-lee", 1)).await?;
    seed_entry(&store, &make_entry("clinic-a", "e-2", "dr-lee", 2)).await?;

    let own = store
        .waiting_entries(&TenantId::new("clinic-a"), &ClinicianId::new("dr-lee"))
        .await
        .map_err(|e| format!("waiting_entries: {e}"))?;
    if own.len() != 2 {
        return Err(format!("expected 2 own entries, got {}", own.len()));
    }

    let foreign = store
        .waiting_entries(&TenantId::new("clinic-b"), &ClinicianId::new("dr-lee"))
        .await
        .map_err(|e| format!("waiting_entries: {e}"))?;
    if !foreign.is_empty() {
        return Err(format!(
            "waiting set leaked across tenants: {} entries",
            foreign.len()
        ));
    }

    let listed = store
        .list_entries(
            &TenantId::new("clinic-b"),
            &EntryFilter::default(),
            &Page::default(),
        )
        .await
        .map_err(|e| format!("list_entries: {e}"))?;
    if listed.total != 0 {
        return Err(format!(
            "listing leaked across tenants: total {}",
            listed.total
        ));
    }
    Ok(())
}

async fn appointment_reads_are_tenant_scoped<S: FlowStore>(store: S) -> Result<(), String> {
    seed_appointment(&store, &make_appointment("clinic-a", "appt-1", "dr-lee")).await?;

    match store
        .get_appointment(&TenantId::new("clinic-b"), &AppointmentId::new("appt-1"))
        .await
    {
        Err(StorageError::AppointmentNotFound { .. }) => {}
        Err(e) => return Err(format!("expected AppointmentNotFound, got: {e}")),
        Ok(_) => return Err("appointment leaked across tenants".to_string()),
    }

    let link = store
        .active_entry_for_appointment(&TenantId::new("clinic-b"), &AppointmentId::new("appt-1"))
        .await
        .map_err(|e| format!("active_entry_for_appointment: {e}"))?;
    if link.is_some() {
        return Err("appointment link leaked across tenants".to_string());
    }
    Ok(())
}
