//! Input validation for queue entry creation.
//!
//! The wire-facing request carries loose strings; validation turns it into
//! a typed spec or a structured list of field-level failures, so callers
//! see every problem at once rather than the first.

use serde::{Deserialize, Serialize};

use crate::entry::{EntryKind, Priority};
use crate::ids::{AppointmentId, ClinicianId, PatientId};

/// Upper bound on free-text fields, matching what the intake UI accepts.
const MAX_TEXT_LEN: usize = 2000;

/// One field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Malformed input. Recoverable by the caller correcting the listed
/// fields; never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed: ")?;
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", e.field, e.message)?;
        }
        Ok(())
    }
}

/// Wire-facing request to create a queue entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateEntryRequest {
    pub patient_id: String,
    pub clinician_id: String,
    /// "walk_in" or "appointment".
    pub kind: String,
    /// Required when `kind` is "appointment", forbidden otherwise.
    pub appointment_id: Option<String>,
    /// Defaults to "normal" when absent.
    pub priority: Option<String>,
    pub reason_for_visit: Option<String>,
    pub notes: Option<String>,
}

/// A validated, typed creation spec.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateEntrySpec {
    pub patient_id: PatientId,
    pub clinician_id: ClinicianId,
    pub kind: EntryKind,
    pub priority: Priority,
    pub reason_for_visit: Option<String>,
    pub notes: Option<String>,
}

fn check_text(field: &str, value: &Option<String>, errors: &mut Vec<FieldError>) {
    if let Some(text) = value {
        if text.len() > MAX_TEXT_LEN {
            errors.push(FieldError {
                field: field.to_string(),
                message: format!("must be at most {MAX_TEXT_LEN} characters"),
            });
        }
    }
}

/// Validate a creation request, collecting every field failure.
pub fn validate_create_entry(
    request: &CreateEntryRequest,
) -> Result<CreateEntrySpec, ValidationError> {
    let mut errors = Vec::new();

    if request.patient_id.trim().is_empty() {
        errors.push(FieldError {
            field: "patient_id".to_string(),
            message: "is required".to_string(),
        });
    }
    if request.clinician_id.trim().is_empty() {
        errors.push(FieldError {
            field: "clinician_id".to_string(),
            message: "is required".to_string(),
        });
    }

    let kind = match request.kind.as_str() {
        "walk_in" => {
            if request.appointment_id.is_some() {
                errors.push(FieldError {
                    field: "appointment_id".to_string(),
                    message: "must be absent for walk-in entries".to_string(),
                });
            }
            Some(EntryKind::WalkIn)
        }
        "appointment" => match request.appointment_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Some(EntryKind::Appointment {
                appointment_id: AppointmentId::new(id),
            }),
            _ => {
                errors.push(FieldError {
                    field: "appointment_id".to_string(),
                    message: "is required for appointment-derived entries".to_string(),
                });
                None
            }
        },
        other => {
            errors.push(FieldError {
                field: "kind".to_string(),
                message: format!("unknown kind '{other}' (expected walk_in or appointment)"),
            });
            None
        }
    };

    let priority = match request.priority.as_deref() {
        None => Some(Priority::default()),
        Some(raw) => match raw.parse::<Priority>() {
            Ok(p) => Some(p),
            Err(message) => {
                errors.push(FieldError {
                    field: "priority".to_string(),
                    message,
                });
                None
            }
        },
    };

    check_text("reason_for_visit", &request.reason_for_visit, &mut errors);
    check_text("notes", &request.notes, &mut errors);

    let (Some(kind), Some(priority)) = (kind, priority) else {
        return Err(ValidationError { errors });
    };
    if !errors.is_empty() {
        return Err(ValidationError { errors });
    }

    Ok(CreateEntrySpec {
        patient_id: PatientId::new(request.patient_id.trim()),
        clinician_id: ClinicianId::new(request.clinician_id.trim()),
        kind,
        priority,
        reason_for_visit: request.reason_for_visit.clone(),
        notes: request.notes.clone(),
    })
}
