//! The queue service orchestrator.
//!
//! Every mutating operation follows the same shape: read the committed
//! state, compute a plan with the pure domain core, stage the whole plan
//! into one store snapshot, and commit. Contention (a raced sequence CAS
//! or a stale entry version) aborts the snapshot and the operation re-reads
//! and retries a bounded number of times with jittered backoff before
//! surfacing a conflict. Nothing is cached between requests; every read
//! recomputes queue order from the store.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use time::OffsetDateTime;

use careflow_core::{
    apply_transition, cascade_for, plan_insert, plan_renormalize, validate_create_entry,
    validate_reorder, AppliedTransition, AppointmentCascade, ClinicianId, CreateEntryRequest,
    CreateEntrySpec, EntryId, FieldError, InsertPlan, Lifecycle, QueueEntry, QueueStatus,
    ValidationError,
};
use careflow_storage::{EntryFilter, FlowStore, Page, PageResult, StorageError};

use crate::allocator;
use crate::bridge::{stage_cascade, CascadeOutcome};
use crate::context::{Clock, RequestContext};
use crate::error::{ServiceError, WithWarnings};
use crate::stats::{aggregate, QueueStatistics};

/// Service tuning knobs.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Attempts per mutating operation before surfacing a conflict.
    pub max_attempts: u32,
    /// Linear backoff base per attempt, milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound of the random jitter added to each backoff, milliseconds.
    pub backoff_jitter_ms: u64,
    /// Average consultation length used for estimated waits.
    pub average_consult_minutes: i64,
    /// Hard cap on listing page size.
    pub max_page_size: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 10,
            backoff_jitter_ms: 15,
            average_consult_minutes: 15,
            max_page_size: 100,
        }
    }
}

/// The patient-flow orchestrator. Stateless compute over a shared store;
/// clone-cheap via the inner `Arc`s, safe to share across request handlers.
pub struct QueueService<S: FlowStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl<S: FlowStore> QueueService<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(store, clock, ServiceConfig::default())
    }

    pub fn with_config(store: Arc<S>, clock: Arc<dyn Clock>, config: ServiceConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    // ── Create ──────────────────────────────────────────────────────────

    /// Create a queue entry with status `waiting`.
    ///
    /// Validates the input and the participants' tenant membership; for
    /// appointment-derived entries also validates the link (same tenant,
    /// same patient/clinician pair, no other active entry on the
    /// appointment) and cascades the check-in to the appointment.
    pub async fn create_entry(
        &self,
        request: &CreateEntryRequest,
        ctx: &RequestContext,
    ) -> Result<WithWarnings<QueueEntry>, ServiceError> {
        let spec = validate_create_entry(request)?;

        if !self
            .store
            .patient_exists(&ctx.tenant_id, &spec.patient_id)
            .await?
        {
            return Err(ServiceError::NotFound {
                kind: "patient",
                id: spec.patient_id.to_string(),
            });
        }
        if !self
            .store
            .clinician_exists(&ctx.tenant_id, &spec.clinician_id)
            .await?
        {
            return Err(ServiceError::NotFound {
                kind: "clinician",
                id: spec.clinician_id.to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            // Re-checked on every attempt: a concurrent check-in for the
            // same appointment forces this writer through the sequence CAS
            // and back here, where the winner's entry is now visible.
            self.check_appointment_link(&spec, ctx).await?;
            match self.try_create(&spec, ctx).await {
                Ok(result) => {
                    tracing::info!(
                        tenant = %ctx.tenant_id,
                        actor = %ctx.user_id,
                        role = %ctx.role,
                        entry = %result.value.id,
                        clinician = %spec.clinician_id,
                        position = result.value.position,
                        "queue entry created"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    tracing::debug!(error = %e, attempt, "create contended, retrying");
                    self.backoff(attempt).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ServiceError::Conflict { attempts: attempt })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Validate an appointment link: the appointment must resolve within
    /// the tenant, belong to the same patient/clinician pair, and carry
    /// no other active queue entry.
    async fn check_appointment_link(
        &self,
        spec: &CreateEntrySpec,
        ctx: &RequestContext,
    ) -> Result<(), ServiceError> {
        let Some(appointment_id) = spec.kind.appointment_id() else {
            return Ok(());
        };
        let appointment = self
            .store
            .get_appointment(&ctx.tenant_id, appointment_id)
            .await?;
        if appointment.patient_id != spec.patient_id
            || appointment.clinician_id != spec.clinician_id
        {
            return Err(ServiceError::Validation(ValidationError {
                errors: vec![FieldError {
                    field: "appointment_id".to_string(),
                    message: "appointment belongs to a different patient or clinician"
                        .to_string(),
                }],
            }));
        }
        if let Some(existing) = self
            .store
            .active_entry_for_appointment(&ctx.tenant_id, appointment_id)
            .await?
        {
            return Err(ServiceError::DuplicateLink {
                appointment_id: appointment_id.clone(),
                entry_id: existing.id,
            });
        }
        Ok(())
    }

    async fn try_create(
        &self,
        spec: &CreateEntrySpec,
        ctx: &RequestContext,
    ) -> Result<WithWarnings<QueueEntry>, StorageError> {
        let now = self.clock.now();
        let key = allocator::sequence_key(&ctx.tenant_id, &spec.clinician_id, now.date());
        let observed_sequence = self.store.read_sequence(&key).await?;
        let waiting = self
            .store
            .waiting_entries(&ctx.tenant_id, &spec.clinician_id)
            .await?;
        let plan = plan_insert(&waiting, spec.priority, now);

        let mut snapshot = self.store.begin_snapshot().await?;
        match self
            .stage_create(&mut snapshot, spec, ctx, now, observed_sequence, &waiting, &plan)
            .await
        {
            Ok(result) => {
                self.store.commit_snapshot(snapshot).await?;
                Ok(result)
            }
            Err(e) => {
                let _ = self.store.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage_create(
        &self,
        snapshot: &mut S::Snapshot,
        spec: &CreateEntrySpec,
        ctx: &RequestContext,
        now: OffsetDateTime,
        observed_sequence: u64,
        waiting: &[QueueEntry],
        plan: &InsertPlan,
    ) -> Result<WithWarnings<QueueEntry>, StorageError> {
        let allocation = allocator::allocate(
            self.store.as_ref(),
            snapshot,
            &ctx.tenant_id,
            &spec.clinician_id,
            now.date(),
            observed_sequence,
        )
        .await?;

        let by_id: BTreeMap<&EntryId, &QueueEntry> =
            waiting.iter().map(|e| (&e.id, e)).collect();
        for change in &plan.shifts {
            if let Some(existing) = by_id.get(&change.entry_id) {
                let mut shifted = (*existing).clone();
                shifted.position = change.new_position;
                self.store
                    .update_entry(snapshot, &shifted, change.expected_version)
                    .await?;
            }
        }

        let entry = QueueEntry {
            id: EntryId::generate(),
            tenant_id: ctx.tenant_id.clone(),
            queue_number: allocation.queue_number,
            kind: spec.kind.clone(),
            patient_id: spec.patient_id.clone(),
            clinician_id: spec.clinician_id.clone(),
            priority: spec.priority,
            position: plan.position,
            status: QueueStatus::Waiting,
            joined_at: now,
            called_at: None,
            called_by: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            cancel_reason: None,
            actual_wait_minutes: None,
            estimated_wait_minutes: None,
            reason_for_visit: spec.reason_for_visit.clone(),
            notes: spec.notes.clone(),
            lifecycle: Lifecycle::Active,
            version: 0,
        };
        self.store.insert_entry(snapshot, &entry).await?;

        let mut warnings = Vec::new();
        if let Some(appointment_id) = entry.kind.appointment_id() {
            if let CascadeOutcome::Orphaned(warning) = stage_cascade(
                self.store.as_ref(),
                snapshot,
                &ctx.tenant_id,
                appointment_id,
                AppointmentCascade::CheckIn,
                now,
                None,
            )
            .await?
            {
                warnings.push(warning);
            }
        }
        Ok(WithWarnings::new(entry, warnings))
    }

    // ── Status transitions ──────────────────────────────────────────────

    /// Apply a status transition to an entry, with its side effects: the
    /// edge's timestamps, renormalization of the remaining waiting
    /// positions when the entry leaves `waiting`, and the appointment
    /// cascade for appointment-derived entries.
    pub async fn change_status(
        &self,
        entry_id: &EntryId,
        new_status: QueueStatus,
        reason: Option<String>,
        ctx: &RequestContext,
    ) -> Result<WithWarnings<QueueEntry>, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let stored = self.load_active_entry(entry_id, ctx).await?;

            let now = self.clock.now();
            let mut updated = stored.clone();
            let applied =
                apply_transition(&mut updated, new_status, now, &ctx.user_id, reason.clone())?;

            match self
                .try_status_write(&stored, &updated, &applied, now, ctx)
                .await
            {
                Ok(result) => {
                    tracing::info!(
                        tenant = %ctx.tenant_id,
                        actor = %ctx.user_id,
                        entry = %entry_id,
                        from = %applied.from,
                        to = %applied.to,
                        "queue status changed"
                    );
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    tracing::debug!(error = %e, attempt, "status change contended, retrying");
                    self.backoff(attempt).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ServiceError::Conflict { attempts: attempt })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_status_write(
        &self,
        stored: &QueueEntry,
        updated: &QueueEntry,
        applied: &AppliedTransition,
        now: OffsetDateTime,
        ctx: &RequestContext,
    ) -> Result<WithWarnings<QueueEntry>, StorageError> {
        let mut snapshot = self.store.begin_snapshot().await?;
        match self
            .stage_status_write(&mut snapshot, stored, updated, applied, now, ctx)
            .await
        {
            Ok(result) => {
                self.store.commit_snapshot(snapshot).await?;
                Ok(result)
            }
            Err(e) => {
                let _ = self.store.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }

    async fn stage_status_write(
        &self,
        snapshot: &mut S::Snapshot,
        stored: &QueueEntry,
        updated: &QueueEntry,
        applied: &AppliedTransition,
        now: OffsetDateTime,
        ctx: &RequestContext,
    ) -> Result<WithWarnings<QueueEntry>, StorageError> {
        let new_version = self
            .store
            .update_entry(snapshot, updated, stored.version)
            .await?;

        if applied.left_waiting {
            self.stage_renormalize(snapshot, ctx, &updated.clinician_id, &updated.id)
                .await?;
        }

        let mut warnings = Vec::new();
        if let Some(appointment_id) = updated.kind.appointment_id() {
            if let CascadeOutcome::Orphaned(warning) = stage_cascade(
                self.store.as_ref(),
                snapshot,
                &ctx.tenant_id,
                appointment_id,
                cascade_for(applied.to),
                now,
                updated.cancel_reason.as_deref(),
            )
            .await?
            {
                warnings.push(warning);
            }
        }

        let mut result = updated.clone();
        result.version = new_version;
        Ok(WithWarnings::new(result, warnings))
    }

    /// Compact the waiting positions of a clinician's queue to 1..N,
    /// excluding `leaving`, staging only the entries that move.
    async fn stage_renormalize(
        &self,
        snapshot: &mut S::Snapshot,
        ctx: &RequestContext,
        clinician_id: &ClinicianId,
        leaving: &EntryId,
    ) -> Result<(), StorageError> {
        let waiting = self
            .store
            .waiting_entries(&ctx.tenant_id, clinician_id)
            .await?;
        let remaining: Vec<QueueEntry> = waiting
            .into_iter()
            .filter(|e| &e.id != leaving)
            .collect();
        for change in plan_renormalize(&remaining) {
            if let Some(existing) = remaining.iter().find(|e| e.id == change.entry_id) {
                let mut moved = existing.clone();
                moved.position = change.new_position;
                self.store
                    .update_entry(snapshot, &moved, change.expected_version)
                    .await?;
            }
        }
        Ok(())
    }

    // ── Reorder ─────────────────────────────────────────────────────────

    /// Replace a clinician's waiting order with the given id list.
    ///
    /// The list must exactly match the current active waiting set;
    /// positions become 1..N in the given order, all-or-nothing.
    pub async fn reorder(
        &self,
        clinician_id: &ClinicianId,
        ordered_entry_ids: &[EntryId],
        ctx: &RequestContext,
    ) -> Result<Vec<QueueEntry>, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let waiting = self
                .store
                .waiting_entries(&ctx.tenant_id, clinician_id)
                .await?;
            let changes = validate_reorder(&waiting, ordered_entry_ids)?;
            if changes.is_empty() {
                return Ok(waiting);
            }

            let outcome: Result<(), StorageError> = async {
                let mut snapshot = self.store.begin_snapshot().await?;
                for change in &changes {
                    let Some(existing) = waiting.iter().find(|e| e.id == change.entry_id) else {
                        // validate_reorder only emits ids from `waiting`.
                        continue;
                    };
                    let mut moved = existing.clone();
                    moved.position = change.new_position;
                    if let Err(e) = self
                        .store
                        .update_entry(&mut snapshot, &moved, change.expected_version)
                        .await
                    {
                        let _ = self.store.abort_snapshot(snapshot).await;
                        return Err(e);
                    }
                }
                self.store.commit_snapshot(snapshot).await
            }
            .await;

            match outcome {
                Ok(()) => {
                    tracing::info!(
                        tenant = %ctx.tenant_id,
                        actor = %ctx.user_id,
                        clinician = %clinician_id,
                        entries = ordered_entry_ids.len(),
                        "queue reordered"
                    );
                    return Ok(self
                        .store
                        .waiting_entries(&ctx.tenant_id, clinician_id)
                        .await?);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    tracing::debug!(error = %e, attempt, "reorder contended, retrying");
                    self.backoff(attempt).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ServiceError::Conflict { attempts: attempt })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ── Soft delete ─────────────────────────────────────────────────────

    /// Soft-delete an entry: it leaves ordering and listings but stays on
    /// record for audit. Entries are never hard-deleted.
    pub async fn remove_entry(
        &self,
        entry_id: &EntryId,
        ctx: &RequestContext,
    ) -> Result<QueueEntry, ServiceError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let stored = self.load_active_entry(entry_id, ctx).await?;

            let mut updated = stored.clone();
            updated.lifecycle = Lifecycle::Deleted {
                deleted_at: self.clock.now(),
            };

            let outcome: Result<i64, StorageError> = async {
                let mut snapshot = self.store.begin_snapshot().await?;
                let staged = async {
                    let new_version = self
                        .store
                        .update_entry(&mut snapshot, &updated, stored.version)
                        .await?;
                    if stored.status == QueueStatus::Waiting {
                        self.stage_renormalize(
                            &mut snapshot,
                            ctx,
                            &updated.clinician_id,
                            &updated.id,
                        )
                        .await?;
                    }
                    Ok::<i64, StorageError>(new_version)
                }
                .await;
                match staged {
                    Ok(new_version) => {
                        self.store.commit_snapshot(snapshot).await?;
                        Ok(new_version)
                    }
                    Err(e) => {
                        let _ = self.store.abort_snapshot(snapshot).await;
                        Err(e)
                    }
                }
            }
            .await;

            match outcome {
                Ok(new_version) => {
                    tracing::info!(
                        tenant = %ctx.tenant_id,
                        actor = %ctx.user_id,
                        entry = %entry_id,
                        "queue entry soft-deleted"
                    );
                    let mut result = updated;
                    result.version = new_version;
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_attempts => {
                    tracing::debug!(error = %e, attempt, "soft delete contended, retrying");
                    self.backoff(attempt).await;
                }
                Err(e) if e.is_retryable() => {
                    return Err(ServiceError::Conflict { attempts: attempt })
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────

    /// A clinician's waiting queue in canonical order, with estimated
    /// waits. Optionally appends called/in-progress entries. Read-only.
    pub async fn doctor_queue(
        &self,
        clinician_id: &ClinicianId,
        include_in_consult: bool,
        ctx: &RequestContext,
    ) -> Result<Vec<QueueEntry>, ServiceError> {
        let mut entries = self
            .store
            .waiting_entries(&ctx.tenant_id, clinician_id)
            .await?;
        for entry in &mut entries {
            entry.estimated_wait_minutes = Some(
                i64::from(entry.position.saturating_sub(1)) * self.config.average_consult_minutes,
            );
        }
        if include_in_consult {
            entries.extend(
                self.store
                    .entries_in_consult(&ctx.tenant_id, clinician_id)
                    .await?,
            );
        }
        Ok(entries)
    }

    /// Current-day counts by status and priority plus the average actual
    /// wait over completed entries. Read-only.
    pub async fn statistics(
        &self,
        clinician_id: &ClinicianId,
        ctx: &RequestContext,
    ) -> Result<QueueStatistics, ServiceError> {
        let day = self.clock.now().date();
        let entries = self
            .store
            .entries_for_day(&ctx.tenant_id, clinician_id, day)
            .await?;
        Ok(aggregate(clinician_id.clone(), day, &entries))
    }

    /// Paginated, filterable listing. Read-only; deleted entries excluded.
    pub async fn list_entries(
        &self,
        filter: &EntryFilter,
        page: &Page,
        ctx: &RequestContext,
    ) -> Result<PageResult<QueueEntry>, ServiceError> {
        let bounded = Page {
            page: page.page.max(1),
            per_page: page.per_page.clamp(1, self.config.max_page_size),
        };
        Ok(self
            .store
            .list_entries(&ctx.tenant_id, filter, &bounded)
            .await?)
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// Tenant-scoped load that treats soft-deleted entries as absent.
    async fn load_active_entry(
        &self,
        entry_id: &EntryId,
        ctx: &RequestContext,
    ) -> Result<QueueEntry, ServiceError> {
        let stored = self.store.get_entry(&ctx.tenant_id, entry_id).await?;
        if !stored.lifecycle.is_active() {
            return Err(ServiceError::NotFound {
                kind: "queue entry",
                id: entry_id.to_string(),
            });
        }
        Ok(stored)
    }

    async fn backoff(&self, attempt: u32) {
        let jitter = if self.config.backoff_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.config.backoff_jitter_ms)
        } else {
            0
        };
        let delay = self
            .config
            .backoff_base_ms
            .saturating_mul(u64::from(attempt))
            .saturating_add(jitter);
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    }
}
