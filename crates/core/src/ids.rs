//! Typed identifiers.
//!
//! Every record in the system is scoped to exactly one tenant, and every
//! cross-entity reference is expressed through one of these newtypes so the
//! compiler keeps tenant ids, patient ids, and clinician ids from being
//! swapped for one another. All ids serialize as bare strings.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// An isolated clinic/organization. All data and operations are scoped
    /// to exactly one tenant.
    TenantId
);

string_id!(
    /// A queue entry's primary key, unique within its tenant.
    EntryId
);

string_id!(
    /// A patient reference. The patient record itself lives outside this core.
    PatientId
);

string_id!(
    /// A clinician (doctor) reference. Each clinician owns one waiting queue
    /// per tenant.
    ClinicianId
);

string_id!(
    /// A scheduled appointment reference.
    AppointmentId
);

string_id!(
    /// The acting user, as resolved by the identity collaborator.
    UserId
);

string_id!(
    /// The human-readable ticket number issued by the sequence allocator,
    /// unique per tenant.
    QueueNumber
);

impl EntryId {
    /// Generate a fresh random entry id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
