//! Typed remote procedures.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{
    Ambulance, AmbulanceStatus, Emergency, EmergencyStatus, Lifecycle, TransitionError,
};
use crate::validation::{AppointmentRequest, Validate, ValidationErrors};

/// A server-side function called by name with its serialized arguments.
pub trait RemoteProcedure: Serialize {
    const NAME: &'static str;

    type Output: DeserializeOwned;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookAppointment {
    pub patient_name: String,
    pub doctor_name: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl BookAppointment {
    pub fn from_request_at(
        request: AppointmentRequest,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationErrors> {
        request.validate_at(now)?;
        Ok(Self {
            patient_name: request.patient_name.trim().to_string(),
            doctor_name: request.doctor_name,
            scheduled_at: request.scheduled_at,
            reason: request.reason,
        })
    }

    pub fn from_request(request: AppointmentRequest) -> Result<Self, ValidationErrors> {
        Self::from_request_at(request, Utc::now())
    }
}

impl RemoteProcedure for BookAppointment {
    const NAME: &'static str = "book_appointment";

    /// Id of the new appointment.
    type Output = Uuid;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignAmbulance {
    pub emergency_id: Uuid,
    pub ambulance_id: Uuid,
}

impl AssignAmbulance {
    pub fn new(emergency_id: Uuid, ambulance_id: Uuid) -> Self {
        Self {
            emergency_id,
            ambulance_id,
        }
    }

    /// Checks that both rows may move to `dispatched` before building the call.
    pub fn for_units(
        emergency: &Emergency,
        ambulance: &Ambulance,
    ) -> Result<Self, TransitionError> {
        emergency.status.transition(EmergencyStatus::Dispatched)?;
        ambulance.status.transition(AmbulanceStatus::Dispatched)?;
        Ok(Self::new(emergency.id, ambulance.id))
    }
}

impl RemoteProcedure for AssignAmbulance {
    const NAME: &'static str = "assign_ambulance";

    type Output = ();
}
