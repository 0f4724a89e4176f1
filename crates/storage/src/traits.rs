use async_trait::async_trait;
use time::Date;

use careflow_core::{
    Appointment, AppointmentId, ClinicianId, EntryId, PatientId, QueueEntry, TenantId,
};

use crate::error::StorageError;
use crate::query::{EntryFilter, Page, PageResult, SequenceKey};

/// The persistence trait for Careflow backends.
///
/// A `FlowStore` provides durable, tenant-scoped storage for queue entries,
/// the appointment slice the queue cascades into, per-(tenant, clinician,
/// day) sequence counters, and the patient/clinician directory used for
/// tenant-membership checks.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing
/// an in-progress transaction:
///
/// 1. `begin_snapshot()` starts a transaction and returns a `Snapshot`
/// 2. mutating methods stage writes into `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` makes all staged writes durable at once,
///    or `abort_snapshot(snapshot)` discards them
///
/// A `Snapshot` dropped without committing MUST roll back. Commit is
/// all-or-nothing: a reposition batch, an entry insert plus its sequence
/// advance, or a status change plus its appointment cascade are never
/// observable half-applied.
///
/// ## OCC Conflict Detection
///
/// `update_entry` and `update_appointment` are conditional on
/// `expected_version`; a version mismatch at commit fails the whole
/// snapshot with `StorageError::ConcurrentConflict`. `advance_sequence`
/// is a compare-and-swap on the counter's current value and fails the
/// snapshot with `StorageError::SequenceConflict` when raced. Callers
/// re-read, recompute, and retry.
///
/// ## Tenant Scoping
///
/// Every read takes the tenant id and must never return another tenant's
/// records; a wrong-tenant lookup is indistinguishable from absence.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared across
/// request handlers and async task boundaries.
#[async_trait]
pub trait FlowStore: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this backend. Must be
    /// `Send` to cross async task boundaries.
    type Snapshot: Send;

    // ── Snapshot lifecycle ──────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Sequence counters ───────────────────────────────────────────────

    /// Current value of a sequence counter; zero if never advanced.
    async fn read_sequence(&self, key: &SequenceKey) -> Result<u64, StorageError>;

    /// Stage a compare-and-swap advance of the counter from
    /// `expected_current` to `expected_current + 1`, returning the new
    /// value. The CAS is what serializes concurrent entry creation for
    /// one clinician's day.
    async fn advance_sequence(
        &self,
        snapshot: &mut Self::Snapshot,
        key: &SequenceKey,
        expected_current: u64,
    ) -> Result<u64, StorageError>;

    // ── Queue entries (mutations, within snapshot) ──────────────────────

    /// Stage the insertion of a new entry. Fails the snapshot if the entry
    /// id or queue number already exists for the tenant.
    async fn insert_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: &QueueEntry,
    ) -> Result<(), StorageError>;

    /// Stage a version-validated update. The stored version becomes
    /// `expected_version + 1` (the `version` field on the passed entry is
    /// ignored); the new version is returned.
    async fn update_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: &QueueEntry,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    // ── Queue entries (reads, against committed state) ──────────────────

    /// Load one entry by tenant and id, soft-deleted entries included
    /// (callers decide whether a deleted entry counts as absent).
    async fn get_entry(
        &self,
        tenant_id: &TenantId,
        entry_id: &EntryId,
    ) -> Result<QueueEntry, StorageError>;

    /// The entry currently blocking this appointment from a new link:
    /// active lifecycle, non-terminal status. `None` when the appointment
    /// is free to link.
    async fn active_entry_for_appointment(
        &self,
        tenant_id: &TenantId,
        appointment_id: &AppointmentId,
    ) -> Result<Option<QueueEntry>, StorageError>;

    /// A clinician's active waiting set, ordered by position ascending.
    async fn waiting_entries(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
    ) -> Result<Vec<QueueEntry>, StorageError>;

    /// A clinician's called and in-progress entries, ordered by the
    /// consult timeline (called/started timestamp, then id).
    async fn entries_in_consult(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
    ) -> Result<Vec<QueueEntry>, StorageError>;

    /// Every active-lifecycle entry that joined the clinician's queue on
    /// the given UTC day, any status. The statistics read path.
    async fn entries_for_day(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
        day: Date,
    ) -> Result<Vec<QueueEntry>, StorageError>;

    /// Filtered, paginated listing ordered by join time then id. Deleted
    /// entries never appear.
    async fn list_entries(
        &self,
        tenant_id: &TenantId,
        filter: &EntryFilter,
        page: &Page,
    ) -> Result<PageResult<QueueEntry>, StorageError>;

    // ── Appointments ────────────────────────────────────────────────────

    /// Stage the insertion of an appointment record.
    async fn insert_appointment(
        &self,
        snapshot: &mut Self::Snapshot,
        appointment: &Appointment,
    ) -> Result<(), StorageError>;

    /// Stage a version-validated appointment update; same contract as
    /// [`FlowStore::update_entry`].
    async fn update_appointment(
        &self,
        snapshot: &mut Self::Snapshot,
        appointment: &Appointment,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    async fn get_appointment(
        &self,
        tenant_id: &TenantId,
        appointment_id: &AppointmentId,
    ) -> Result<Appointment, StorageError>;

    // ── Directory (tenant membership) ───────────────────────────────────

    async fn register_patient(
        &self,
        tenant_id: &TenantId,
        patient_id: &PatientId,
    ) -> Result<(), StorageError>;

    async fn register_clinician(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
    ) -> Result<(), StorageError>;

    async fn patient_exists(
        &self,
        tenant_id: &TenantId,
        patient_id: &PatientId,
    ) -> Result<bool, StorageError>;

    async fn clinician_exists(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
    ) -> Result<bool, StorageError>;
}
