mod ambulance;
mod appointment;
mod bed;
mod emergency;
mod medicine;
mod report;

pub use ambulance::{Ambulance, AmbulanceStatus};
pub use appointment::{Appointment, AppointmentStatus};
pub use bed::{occupancy, Bed, BedStatus};
pub use emergency::{Emergency, EmergencyStatus, Severity};
pub use medicine::{Medicine, DEFAULT_LOW_STOCK};
pub use report::Report;

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// A row of a remote table.
pub trait Record {
    /// Remote table name.
    const TABLE: &'static str;

    fn id(&self) -> Uuid;
}

/// A record whose status moves through a fixed lifecycle.
pub trait Tracked: Record {
    type Status: Lifecycle;

    fn status(&self) -> Self::Status;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move from '{from}' to '{to}'")]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

impl TransitionError {
    pub fn new(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Status values with a fixed set of allowed successors.
pub trait Lifecycle: Copy + PartialEq + fmt::Display + 'static {
    fn allowed_next(&self) -> &'static [Self];

    fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    fn can_transition_to(&self, next: Self) -> bool {
        self.allowed_next().contains(&next)
    }

    fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new(self, next))
        }
    }
}
