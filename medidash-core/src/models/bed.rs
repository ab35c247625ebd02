use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Lifecycle, Record, Tracked};
use crate::table::{Column, Tabular};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BedStatus {
    Available,
    Reserved,
    Occupied,
    Cleaning,
}

impl fmt::Display for BedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BedStatus::Available => write!(f, "available"),
            BedStatus::Reserved => write!(f, "reserved"),
            BedStatus::Occupied => write!(f, "occupied"),
            BedStatus::Cleaning => write!(f, "cleaning"),
        }
    }
}

impl FromStr for BedStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(BedStatus::Available),
            "reserved" => Ok(BedStatus::Reserved),
            "occupied" => Ok(BedStatus::Occupied),
            "cleaning" => Ok(BedStatus::Cleaning),
            _ => Err(format!(
                "Invalid bed status '{}'. Valid options: available, reserved, occupied, cleaning",
                s
            )),
        }
    }
}

impl Lifecycle for BedStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use BedStatus::*;
        match self {
            Available => &[Occupied, Reserved],
            Reserved => &[Occupied, Available],
            Occupied => &[Cleaning],
            Cleaning => &[Available],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bed {
    pub id: Uuid,
    pub ward: String,
    pub bed_number: i32,
    pub status: BedStatus,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Bed {
    pub fn new(ward: impl Into<String>, bed_number: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            ward: ward.into(),
            bed_number,
            status: BedStatus::Available,
            patient_name: None,
            updated_at: None,
        }
    }

    pub fn with_patient(mut self, patient_name: impl Into<String>) -> Self {
        self.patient_name = Some(patient_name.into());
        self.status = BedStatus::Occupied;
        self
    }
}

impl Record for Bed {
    const TABLE: &'static str = "beds";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Tracked for Bed {
    type Status = BedStatus;

    fn status(&self) -> BedStatus {
        self.status
    }
}

impl Tabular for Bed {
    fn columns() -> Vec<Column<Self>> {
        vec![
            Column::new("ward", "Ward", |b: &Bed| b.ward.as_str().into()),
            Column::new("number", "Bed", |b: &Bed| b.bed_number.into()),
            Column::new("status", "Status", |b: &Bed| b.status.to_string().into()),
            Column::new("patient", "Patient", |b: &Bed| b.patient_name.clone().into()),
        ]
    }
}

/// Occupancy counts per status, in lifecycle order.
pub fn occupancy(beds: &[Bed]) -> [(BedStatus, usize); 4] {
    let count = |status: BedStatus| beds.iter().filter(|b| b.status == status).count();
    [
        (BedStatus::Available, count(BedStatus::Available)),
        (BedStatus::Reserved, count(BedStatus::Reserved)),
        (BedStatus::Occupied, count(BedStatus::Occupied)),
        (BedStatus::Cleaning, count(BedStatus::Cleaning)),
    ]
}
