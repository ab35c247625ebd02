use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Lifecycle, Record, Tracked};
use crate::table::{Column, Tabular};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    CheckedIn,
    Completed,
    Cancelled,
    NoShow,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::CheckedIn => write!(f, "checked_in"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "checked_in" => Ok(AppointmentStatus::CheckedIn),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            _ => Err(format!(
                "Invalid appointment status '{}'. Valid options: scheduled, checked_in, completed, cancelled, no_show",
                s
            )),
        }
    }
}

impl Lifecycle for AppointmentStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use AppointmentStatus::*;
        match self {
            Scheduled => &[CheckedIn, Cancelled, NoShow],
            CheckedIn => &[Completed],
            Completed | Cancelled | NoShow => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_name: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Appointment {
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.status == AppointmentStatus::Scheduled && self.scheduled_at > now
    }
}

impl Record for Appointment {
    const TABLE: &'static str = "appointments";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Tracked for Appointment {
    type Status = AppointmentStatus;

    fn status(&self) -> AppointmentStatus {
        self.status
    }
}

impl Tabular for Appointment {
    fn columns() -> Vec<Column<Self>> {
        vec![
            Column::new("when", "When", |a: &Appointment| a.scheduled_at.into()).unsearchable(),
            Column::new("patient", "Patient", |a: &Appointment| {
                a.patient_name.as_str().into()
            }),
            Column::new("doctor", "Doctor", |a: &Appointment| a.doctor_name.clone().into()),
            Column::new("status", "Status", |a: &Appointment| a.status.to_string().into()),
            Column::new("reason", "Reason", |a: &Appointment| a.reason.clone().into())
                .unsortable(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn appointment(offset_hours: i64, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_name: "Priya Patel".into(),
            scheduled_at: Utc::now() + Duration::hours(offset_hours),
            status,
            doctor_name: None,
            reason: None,
        }
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!(
            AppointmentStatus::from_str("No-Show").unwrap(),
            AppointmentStatus::NoShow
        );
        assert_eq!(
            serde_json::to_string(&AppointmentStatus::CheckedIn).unwrap(),
            "\"checked_in\""
        );
    }

    #[test]
    fn test_lifecycle() {
        assert!(AppointmentStatus::Scheduled.can_transition_to(AppointmentStatus::NoShow));
        assert!(AppointmentStatus::CheckedIn
            .transition(AppointmentStatus::Cancelled)
            .is_err());
        assert!(AppointmentStatus::Completed.is_terminal());
    }

    #[test]
    fn test_is_upcoming() {
        let now = Utc::now();
        assert!(appointment(2, AppointmentStatus::Scheduled).is_upcoming(now));
        assert!(!appointment(-2, AppointmentStatus::Scheduled).is_upcoming(now));
        assert!(!appointment(2, AppointmentStatus::Cancelled).is_upcoming(now));
    }
}
