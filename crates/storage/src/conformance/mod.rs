//! Conformance test suite for `FlowStore` implementations.
//!
//! A backend-agnostic suite any `FlowStore` backend can run to verify the
//! trait contract. Categories:
//!
//! - **init**: insert/read roundtrips, duplicate detection, directory checks
//! - **occ**: version-validated updates and conflict detection
//! - **commit**: all-or-nothing snapshots, drop/abort rollback
//! - **sequence**: counter CAS semantics
//! - **tenant**: cross-tenant invisibility
//! - **concurrent**: real `tokio::spawn` races over entries and counters
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use careflow_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod init;
mod occ;
mod sequence;
mod tenant;

use std::fmt;
use std::future::Future;

use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use careflow_core::{
    Appointment, AppointmentId, AppointmentStatus, ClinicianId, EntryId, EntryKind, Lifecycle,
    PatientId, Priority, QueueEntry, QueueNumber, QueueStatus, TenantId,
};

use crate::traits::FlowStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "occ", "commit").
    pub category: String,
    /// Test name (e.g. "insert_then_get_roundtrip").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: true,
                message: None,
            },
            Err(msg) => Self {
                category: category.to_string(),
                name: name.to_string(),
                passed: false,
                message: Some(msg),
            },
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` is called once per test to create a fresh, empty store,
/// ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: FlowStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(occ::run_occ_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(sequence::run_sequence_tests(&factory).await);
    results.extend(tenant::run_tenant_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Fixture constructors ─────────────────────────────────────────────────

fn base_time() -> OffsetDateTime {
    datetime!(2025-03-10 09:00 UTC)
}

fn make_entry(tenant: &str, id: &str, clinician: &str, position: u32) -> QueueEntry {
    QueueEntry {
        id: EntryId::new(id),
        tenant_id: TenantId::new(tenant),
        queue_number: QueueNumber::new(format!("20250310-{clinician}-{position:03}")),
        kind: EntryKind::WalkIn,
        patient_id: PatientId::new(format!("patient-{id}")),
        clinician_id: ClinicianId::new(clinician),
        priority: Priority::Normal,
        position,
        status: QueueStatus::Waiting,
        joined_at: base_time() + Duration::minutes(i64::from(position)),
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
    }
}

fn make_appointment(tenant: &str, id: &str, clinician: &str) -> Appointment {
    Appointment {
        id: AppointmentId::new(id),
        tenant_id: TenantId::new(tenant),
        patient_id: PatientId::new(format!("patient-{id}")),
        clinician_id: ClinicianId::new(clinician),
        scheduled_start: base_time(),
        scheduled_end: base_time() + Duration::minutes(30),
        status: AppointmentStatus::Scheduled,
        arrived_at: None,
        started_at: None,
        completed_at: None,
        cancelled_at: None,
        cancel_reason: None,
        version: 0,
    }
}

/// Commit a single entry insert through its own snapshot.
async fn seed_entry<S: FlowStore>(store: &S, entry: &QueueEntry) -> Result<(), String> {
    let mut snap = store
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    store
        .insert_entry(&mut snap, entry)
        .await
        .map_err(|e| format!("insert: {e}"))?;
    store
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))
}

/// Commit a single appointment insert through its own snapshot.
async fn seed_appointment<S: FlowStore>(
    store: &S,
    appointment: &Appointment,
) -> Result<(), String> {
    let mut snap = store
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    store
        .insert_appointment(&mut snap, appointment)
        .await
        .map_err(|e| format!("insert appointment: {e}"))?;
    store
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))
}
