//! Careflow domain core: the patient flow model for a multi-tenant clinic.
//!
//! This crate is pure compute. It defines the typed records (queue entries,
//! the appointment slice the queue cascades into), the queue status state
//! machine with its timestamped effects, the priority ordering engine that
//! places waiting entries, the appointment cascade mapping, and input
//! validation. Persistence, identity, and clocks are collaborators injected
//! at the service layer; nothing here performs I/O.

pub mod appointment;
pub mod bridge;
pub mod entry;
pub mod ids;
pub mod ordering;
pub mod transition;
pub mod validate;

pub use appointment::{Appointment, AppointmentStatus};
pub use bridge::{apply_cascade, cascade_for, AppointmentCascade};
pub use entry::{EntryKind, Lifecycle, Priority, QueueEntry, QueueStatus};
pub use ids::{
    AppointmentId, ClinicianId, EntryId, PatientId, QueueNumber, TenantId, UserId,
};
pub use ordering::{
    plan_insert, plan_renormalize, validate_reorder, waiting_order, InsertPlan, PositionChange,
    ReorderError,
};
pub use transition::{apply_transition, AppliedTransition, TransitionError};
pub use validate::{
    validate_create_entry, CreateEntryRequest, CreateEntrySpec, FieldError, ValidationError,
};
