use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Lifecycle, Record, Tracked};
use crate::table::{Column, Tabular};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbulanceStatus {
    Available,
    Dispatched,
    Returning,
    Maintenance,
}

impl fmt::Display for AmbulanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmbulanceStatus::Available => write!(f, "available"),
            AmbulanceStatus::Dispatched => write!(f, "dispatched"),
            AmbulanceStatus::Returning => write!(f, "returning"),
            AmbulanceStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

impl FromStr for AmbulanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(AmbulanceStatus::Available),
            "dispatched" => Ok(AmbulanceStatus::Dispatched),
            "returning" => Ok(AmbulanceStatus::Returning),
            "maintenance" => Ok(AmbulanceStatus::Maintenance),
            _ => Err(format!(
                "Invalid ambulance status '{}'. Valid options: available, dispatched, returning, maintenance",
                s
            )),
        }
    }
}

impl Lifecycle for AmbulanceStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use AmbulanceStatus::*;
        match self {
            Available => &[Dispatched, Maintenance],
            Dispatched => &[Returning],
            Returning => &[Available],
            Maintenance => &[Available],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ambulance {
    pub id: Uuid,
    pub call_sign: String,
    pub status: AmbulanceStatus,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Ambulance {
    pub fn new(call_sign: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            call_sign: call_sign.into(),
            status: AmbulanceStatus::Available,
            driver_name: None,
            location: None,
            updated_at: None,
        }
    }

    pub fn with_driver(mut self, driver_name: impl Into<String>) -> Self {
        self.driver_name = Some(driver_name.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == AmbulanceStatus::Available
    }
}

impl Record for Ambulance {
    const TABLE: &'static str = "ambulances";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Tracked for Ambulance {
    type Status = AmbulanceStatus;

    fn status(&self) -> AmbulanceStatus {
        self.status
    }
}

impl Tabular for Ambulance {
    fn columns() -> Vec<Column<Self>> {
        vec![
            Column::new("call_sign", "Unit", |a: &Ambulance| a.call_sign.as_str().into()),
            Column::new("status", "Status", |a: &Ambulance| a.status.to_string().into()),
            Column::new("driver", "Driver", |a: &Ambulance| a.driver_name.clone().into()),
            Column::new("location", "Location", |a: &Ambulance| a.location.clone().into()),
            Column::new("updated", "Updated", |a: &Ambulance| a.updated_at.into())
                .unsearchable(),
        ]
    }
}
