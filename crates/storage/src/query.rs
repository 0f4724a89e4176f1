//! Query-side types: sequence keys, listing filters, and pagination.

use serde::{Deserialize, Serialize};
use time::Date;

use careflow_core::{ClinicianId, PatientId, Priority, QueueStatus, TenantId};

/// Key of one sequence counter: the queue-number allocator is scoped to
/// a (tenant, clinician, calendar day) triple, never process-global.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceKey {
    pub tenant_id: TenantId,
    pub clinician_id: ClinicianId,
    pub day: Date,
}

impl std::fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.clinician_id, self.day)
    }
}

/// Entry-kind filter for listings (the link target id is irrelevant when
/// filtering, so this is a plain tag rather than `EntryKind`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindFilter {
    Appointment,
    WalkIn,
}

/// Filterable listing criteria. Absent fields match everything; deleted
/// entries never match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    pub status: Option<QueueStatus>,
    pub priority: Option<Priority>,
    pub kind: Option<KindFilter>,
    /// Calendar day the entry joined the queue (UTC).
    pub day: Option<Date>,
    pub patient_id: Option<PatientId>,
    pub clinician_id: Option<ClinicianId>,
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub page: u64,
    pub per_page: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 25,
        }
    }
}

impl Page {
    /// Number of items to skip before this page.
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}
