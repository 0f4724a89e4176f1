//! In-memory reference backend.
//!
//! Snapshots stage their writes as a plain list of operations; commit
//! validates every staged write (versions, uniqueness, sequence CAS)
//! against a working copy of the state and swaps it in only when the whole
//! batch passes, so a snapshot is atomic by construction and dropping one
//! without committing discards it. Mutating methods also fail fast against
//! the committed state at staging time, which lets callers abort a doomed
//! snapshot before commit.
//!
//! This backend favors obviousness over throughput: one lock, whole-state
//! working copies at commit. It exists as the fixture for the conformance
//! suite, the service tests, and the dev server.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use time::Date;
use tokio::sync::Mutex;

use careflow_core::{
    Appointment, AppointmentId, ClinicianId, EntryId, PatientId, QueueEntry, QueueNumber,
    QueueStatus, TenantId,
};

use crate::error::StorageError;
use crate::query::{EntryFilter, KindFilter, Page, PageResult, SequenceKey};
use crate::traits::FlowStore;

#[derive(Debug, Default, Clone)]
struct Inner {
    entries: BTreeMap<(TenantId, EntryId), QueueEntry>,
    queue_numbers: BTreeSet<(TenantId, QueueNumber)>,
    appointments: BTreeMap<(TenantId, AppointmentId), Appointment>,
    sequences: BTreeMap<SequenceKey, u64>,
    patients: BTreeSet<(TenantId, PatientId)>,
    clinicians: BTreeSet<(TenantId, ClinicianId)>,
}

/// One staged write. Validation runs at staging time (fail fast, against
/// committed state) and again at commit (authoritative, against the
/// evolving working copy).
#[derive(Debug, Clone)]
enum Staged {
    InsertEntry(QueueEntry),
    UpdateEntry {
        entry: QueueEntry,
        expected_version: i64,
    },
    AdvanceSequence {
        key: SequenceKey,
        expected: u64,
    },
    InsertAppointment(Appointment),
    UpdateAppointment {
        appointment: Appointment,
        expected_version: i64,
    },
}

/// An uncommitted transaction: just the staged writes.
#[derive(Debug, Default)]
pub struct MemorySnapshot {
    staged: Vec<Staged>,
}

/// The in-memory `FlowStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply(state: &mut Inner, op: &Staged) -> Result<(), StorageError> {
    match op {
        Staged::InsertEntry(entry) => {
            let key = (entry.tenant_id.clone(), entry.id.clone());
            if state.entries.contains_key(&key) {
                return Err(StorageError::AlreadyExists {
                    entity: "queue entry",
                    id: entry.id.to_string(),
                });
            }
            let number_key = (entry.tenant_id.clone(), entry.queue_number.clone());
            if !state.queue_numbers.insert(number_key) {
                return Err(StorageError::DuplicateQueueNumber {
                    tenant_id: entry.tenant_id.clone(),
                    queue_number: entry.queue_number.clone(),
                });
            }
            state.entries.insert(key, entry.clone());
            Ok(())
        }
        Staged::UpdateEntry {
            entry,
            expected_version,
        } => {
            let key = (entry.tenant_id.clone(), entry.id.clone());
            let current = state.entries.get_mut(&key).ok_or_else(|| {
                StorageError::EntryNotFound {
                    tenant_id: entry.tenant_id.clone(),
                    entry_id: entry.id.clone(),
                }
            })?;
            if current.version != *expected_version {
                return Err(StorageError::ConcurrentConflict {
                    entity: "queue entry",
                    id: entry.id.to_string(),
                    expected_version: *expected_version,
                });
            }
            let mut updated = entry.clone();
            updated.version = expected_version + 1;
            *current = updated;
            Ok(())
        }
        Staged::AdvanceSequence { key, expected } => {
            let current = state.sequences.get(key).copied().unwrap_or(0);
            if current != *expected {
                return Err(StorageError::SequenceConflict {
                    key: key.to_string(),
                    expected: *expected,
                });
            }
            state.sequences.insert(key.clone(), expected + 1);
            Ok(())
        }
        Staged::InsertAppointment(appointment) => {
            let key = (appointment.tenant_id.clone(), appointment.id.clone());
            if state.appointments.contains_key(&key) {
                return Err(StorageError::AlreadyExists {
                    entity: "appointment",
                    id: appointment.id.to_string(),
                });
            }
            state.appointments.insert(key, appointment.clone());
            Ok(())
        }
        Staged::UpdateAppointment {
            appointment,
            expected_version,
        } => {
            let key = (appointment.tenant_id.clone(), appointment.id.clone());
            let current = state.appointments.get_mut(&key).ok_or_else(|| {
                StorageError::AppointmentNotFound {
                    tenant_id: appointment.tenant_id.clone(),
                    appointment_id: appointment.id.clone(),
                }
            })?;
            if current.version != *expected_version {
                return Err(StorageError::ConcurrentConflict {
                    entity: "appointment",
                    id: appointment.id.to_string(),
                    expected_version: *expected_version,
                });
            }
            let mut updated = appointment.clone();
            updated.version = expected_version + 1;
            *current = updated;
            Ok(())
        }
    }
}

fn matches_filter(entry: &QueueEntry, filter: &EntryFilter) -> bool {
    if let Some(status) = filter.status {
        if entry.status != status {
            return false;
        }
    }
    if let Some(priority) = filter.priority {
        if entry.priority != priority {
            return false;
        }
    }
    if let Some(kind) = filter.kind {
        let is_appointment = entry.kind.appointment_id().is_some();
        match kind {
            KindFilter::Appointment if !is_appointment => return false,
            KindFilter::WalkIn if is_appointment => return false,
            _ => {}
        }
    }
    if let Some(day) = filter.day {
        if entry.joined_at.date() != day {
            return false;
        }
    }
    if let Some(patient_id) = &filter.patient_id {
        if &entry.patient_id != patient_id {
            return false;
        }
    }
    if let Some(clinician_id) = &filter.clinician_id {
        if &entry.clinician_id != clinician_id {
            return false;
        }
    }
    true
}

#[async_trait]
impl FlowStore for MemoryStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError> {
        Ok(MemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        let mut next = inner.clone();
        for op in &snapshot.staged {
            apply(&mut next, op)?;
        }
        *inner = next;
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn read_sequence(&self, key: &SequenceKey) -> Result<u64, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner.sequences.get(key).copied().unwrap_or(0))
    }

    async fn advance_sequence(
        &self,
        snapshot: &mut Self::Snapshot,
        key: &SequenceKey,
        expected_current: u64,
    ) -> Result<u64, StorageError> {
        let inner = self.inner.lock().await;
        let current = inner.sequences.get(key).copied().unwrap_or(0);
        if current != expected_current {
            return Err(StorageError::SequenceConflict {
                key: key.to_string(),
                expected: expected_current,
            });
        }
        drop(inner);
        snapshot.staged.push(Staged::AdvanceSequence {
            key: key.clone(),
            expected: expected_current,
        });
        Ok(expected_current + 1)
    }

    async fn insert_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: &QueueEntry,
    ) -> Result<(), StorageError> {
        let inner = self.inner.lock().await;
        let key = (entry.tenant_id.clone(), entry.id.clone());
        if inner.entries.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                entity: "queue entry",
                id: entry.id.to_string(),
            });
        }
        drop(inner);
        snapshot.staged.push(Staged::InsertEntry(entry.clone()));
        Ok(())
    }

    async fn update_entry(
        &self,
        snapshot: &mut Self::Snapshot,
        entry: &QueueEntry,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let inner = self.inner.lock().await;
        let key = (entry.tenant_id.clone(), entry.id.clone());
        match inner.entries.get(&key) {
            None => {
                return Err(StorageError::EntryNotFound {
                    tenant_id: entry.tenant_id.clone(),
                    entry_id: entry.id.clone(),
                })
            }
            Some(current) if current.version != expected_version => {
                return Err(StorageError::ConcurrentConflict {
                    entity: "queue entry",
                    id: entry.id.to_string(),
                    expected_version,
                })
            }
            Some(_) => {}
        }
        drop(inner);
        snapshot.staged.push(Staged::UpdateEntry {
            entry: entry.clone(),
            expected_version,
        });
        Ok(expected_version + 1)
    }

    async fn get_entry(
        &self,
        tenant_id: &TenantId,
        entry_id: &EntryId,
    ) -> Result<QueueEntry, StorageError> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .get(&(tenant_id.clone(), entry_id.clone()))
            .cloned()
            .ok_or_else(|| StorageError::EntryNotFound {
                tenant_id: tenant_id.clone(),
                entry_id: entry_id.clone(),
            })
    }

    async fn active_entry_for_appointment(
        &self,
        tenant_id: &TenantId,
        appointment_id: &AppointmentId,
    ) -> Result<Option<QueueEntry>, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .values()
            .find(|e| {
                e.tenant_id == *tenant_id
                    && e.kind.appointment_id() == Some(appointment_id)
                    && e.is_active_link()
            })
            .cloned())
    }

    async fn waiting_entries(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
    ) -> Result<Vec<QueueEntry>, StorageError> {
        let inner = self.inner.lock().await;
        let mut waiting: Vec<QueueEntry> = inner
            .entries
            .values()
            .filter(|e| {
                e.tenant_id == *tenant_id
                    && e.clinician_id == *clinician_id
                    && e.status == QueueStatus::Waiting
                    && e.lifecycle.is_active()
            })
            .cloned()
            .collect();
        waiting.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Ok(waiting)
    }

    async fn entries_in_consult(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
    ) -> Result<Vec<QueueEntry>, StorageError> {
        let inner = self.inner.lock().await;
        let mut in_consult: Vec<QueueEntry> = inner
            .entries
            .values()
            .filter(|e| {
                e.tenant_id == *tenant_id
                    && e.clinician_id == *clinician_id
                    && matches!(e.status, QueueStatus::Called | QueueStatus::InProgress)
                    && e.lifecycle.is_active()
            })
            .cloned()
            .collect();
        in_consult.sort_by(|a, b| {
            let a_key = a.started_at.or(a.called_at);
            let b_key = b.started_at.or(b.called_at);
            a_key.cmp(&b_key).then_with(|| a.id.cmp(&b.id))
        });
        Ok(in_consult)
    }

    async fn entries_for_day(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
        day: Date,
    ) -> Result<Vec<QueueEntry>, StorageError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<QueueEntry> = inner
            .entries
            .values()
            .filter(|e| {
                e.tenant_id == *tenant_id
                    && e.clinician_id == *clinician_id
                    && e.joined_at.date() == day
                    && e.lifecycle.is_active()
            })
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    async fn list_entries(
        &self,
        tenant_id: &TenantId,
        filter: &EntryFilter,
        page: &Page,
    ) -> Result<PageResult<QueueEntry>, StorageError> {
        let inner = self.inner.lock().await;
        let mut matched: Vec<QueueEntry> = inner
            .entries
            .values()
            .filter(|e| {
                e.tenant_id == *tenant_id && e.lifecycle.is_active() && matches_filter(e, filter)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .collect();
        Ok(PageResult {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn insert_appointment(
        &self,
        snapshot: &mut Self::Snapshot,
        appointment: &Appointment,
    ) -> Result<(), StorageError> {
        let inner = self.inner.lock().await;
        let key = (appointment.tenant_id.clone(), appointment.id.clone());
        if inner.appointments.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                entity: "appointment",
                id: appointment.id.to_string(),
            });
        }
        drop(inner);
        snapshot
            .staged
            .push(Staged::InsertAppointment(appointment.clone()));
        Ok(())
    }

    async fn update_appointment(
        &self,
        snapshot: &mut Self::Snapshot,
        appointment: &Appointment,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let inner = self.inner.lock().await;
        let key = (appointment.tenant_id.clone(), appointment.id.clone());
        match inner.appointments.get(&key) {
            None => {
                return Err(StorageError::AppointmentNotFound {
                    tenant_id: appointment.tenant_id.clone(),
                    appointment_id: appointment.id.clone(),
                })
            }
            Some(current) if current.version != expected_version => {
                return Err(StorageError::ConcurrentConflict {
                    entity: "appointment",
                    id: appointment.id.to_string(),
                    expected_version,
                })
            }
            Some(_) => {}
        }
        drop(inner);
        snapshot.staged.push(Staged::UpdateAppointment {
            appointment: appointment.clone(),
            expected_version,
        });
        Ok(expected_version + 1)
    }

    async fn get_appointment(
        &self,
        tenant_id: &TenantId,
        appointment_id: &AppointmentId,
    ) -> Result<Appointment, StorageError> {
        let inner = self.inner.lock().await;
        inner
            .appointments
            .get(&(tenant_id.clone(), appointment_id.clone()))
            .cloned()
            .ok_or_else(|| StorageError::AppointmentNotFound {
                tenant_id: tenant_id.clone(),
                appointment_id: appointment_id.clone(),
            })
    }

    async fn register_patient(
        &self,
        tenant_id: &TenantId,
        patient_id: &PatientId,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner
            .patients
            .insert((tenant_id.clone(), patient_id.clone()));
        Ok(())
    }

    async fn register_clinician(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().await;
        inner
            .clinicians
            .insert((tenant_id.clone(), clinician_id.clone()));
        Ok(())
    }

    async fn patient_exists(
        &self,
        tenant_id: &TenantId,
        patient_id: &PatientId,
    ) -> Result<bool, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .patients
            .contains(&(tenant_id.clone(), patient_id.clone())))
    }

    async fn clinician_exists(
        &self,
        tenant_id: &TenantId,
        clinician_id: &ClinicianId,
    ) -> Result<bool, StorageError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .clinicians
            .contains(&(tenant_id.clone(), clinician_id.clone())))
    }
}
