use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Lifecycle, Record, Tracked};
use crate::table::{CellValue, Column, Tabular};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Severity::Low),
            "moderate" | "medium" => Ok(Severity::Moderate),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!(
                "Invalid severity '{}'. Valid options: low, moderate, high, critical",
                s
            )),
        }
    }
}

/// Re-triage may move a case to any other level.
impl Lifecycle for Severity {
    fn allowed_next(&self) -> &'static [Self] {
        use Severity::*;
        match self {
            Low => &[Moderate, High, Critical],
            Moderate => &[Low, High, Critical],
            High => &[Low, Moderate, Critical],
            Critical => &[Low, Moderate, High],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    Pending,
    Dispatched,
    InProgress,
    Resolved,
    Cancelled,
}

impl fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmergencyStatus::Pending => write!(f, "pending"),
            EmergencyStatus::Dispatched => write!(f, "dispatched"),
            EmergencyStatus::InProgress => write!(f, "in_progress"),
            EmergencyStatus::Resolved => write!(f, "resolved"),
            EmergencyStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for EmergencyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(EmergencyStatus::Pending),
            "dispatched" => Ok(EmergencyStatus::Dispatched),
            "in_progress" => Ok(EmergencyStatus::InProgress),
            "resolved" => Ok(EmergencyStatus::Resolved),
            "cancelled" => Ok(EmergencyStatus::Cancelled),
            _ => Err(format!(
                "Invalid emergency status '{}'. Valid options: pending, dispatched, in_progress, resolved, cancelled",
                s
            )),
        }
    }
}

impl Lifecycle for EmergencyStatus {
    fn allowed_next(&self) -> &'static [Self] {
        use EmergencyStatus::*;
        match self {
            Pending => &[Dispatched, Cancelled],
            Dispatched => &[InProgress, Cancelled],
            InProgress => &[Resolved],
            Resolved | Cancelled => &[],
        }
    }
}

/// An incoming emergency call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emergency {
    pub id: Uuid,
    pub patient_name: String,
    pub location: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub severity: Severity,
    pub status: EmergencyStatus,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ambulance_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Emergency {
    pub fn new(
        patient_name: impl Into<String>,
        location: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_name: patient_name.into(),
            location: location.into(),
            phone: None,
            severity,
            status: EmergencyStatus::Pending,
            description: None,
            ambulance_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

impl Record for Emergency {
    const TABLE: &'static str = "emergencies";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Tracked for Emergency {
    type Status = EmergencyStatus;

    fn status(&self) -> EmergencyStatus {
        self.status
    }
}

impl Tabular for Emergency {
    fn columns() -> Vec<Column<Self>> {
        vec![
            Column::new("patient", "Patient", |e: &Emergency| {
                e.patient_name.as_str().into()
            }),
            Column::new("location", "Location", |e: &Emergency| e.location.as_str().into()),
            // Severity sorts by rank, not by name
            Column::new("severity", "Severity", |e: &Emergency| {
                CellValue::Integer(e.severity as i64)
            })
            .render_with(|v| match v {
                CellValue::Integer(0) => "low".to_string(),
                CellValue::Integer(1) => "moderate".to_string(),
                CellValue::Integer(2) => "high".to_string(),
                CellValue::Integer(3) => "CRITICAL".to_string(),
                other => other.to_string(),
            }),
            Column::new("status", "Status", |e: &Emergency| e.status.to_string().into()),
            Column::new("phone", "Phone", |e: &Emergency| e.phone.clone().into()).unsortable(),
            Column::new("created", "Reported", |e: &Emergency| e.created_at.into())
                .unsearchable(),
        ]
    }
}

impl fmt::Display for Emergency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Emergency: {} ({})", self.patient_name, self.severity)?;
        writeln!(f, "{}", "=".repeat(30))?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Location: {}", self.location)?;
        writeln!(f, "Status: {}", self.status)?;
        if let Some(phone) = &self.phone {
            writeln!(f, "Phone: {}", phone)?;
        }
        if let Some(description) = &self.description {
            writeln!(f, "\n{}", description)?;
        }
        Ok(())
    }
}
