//! Form validation for records created from the dashboard.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::{Emergency, Medicine, Severity};

pub const MAX_REASON_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("invalid input: {}", join(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    fn require(&mut self, field: &'static str, value: &str) {
        if value.trim().is_empty() {
            self.add(field, "is required");
        }
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

pub trait Validate {
    /// Validates against the given clock.
    fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors>;

    fn validate(&self) -> Result<(), ValidationErrors> {
        self.validate_at(Utc::now())
    }
}

/// 7-15 digits, optional leading `+`; spaces and dashes are ignored.
pub fn is_valid_phone(phone: &str) -> bool {
    let trimmed = phone.trim();
    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits: String = digits.chars().filter(|c| *c != ' ' && *c != '-').collect();
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewEmergency {
    pub patient_name: String,
    pub location: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub description: Option<String>,
}

impl Validate for NewEmergency {
    fn validate_at(&self, _now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("patient_name", &self.patient_name);
        errors.require("location", &self.location);
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.trim().is_empty()) {
            if !is_valid_phone(phone) {
                errors.add("phone", "must be 7-15 digits with an optional leading +");
            }
        }
        errors.into_result()
    }
}

impl NewEmergency {
    /// Validates and builds the row to insert.
    pub fn into_emergency(self) -> Result<Emergency, ValidationErrors> {
        self.validate()?;
        let mut emergency = Emergency::new(
            self.patient_name.trim(),
            self.location.trim(),
            self.severity,
        );
        emergency.phone = self
            .phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        emergency.description = self.description.filter(|d| !d.trim().is_empty());
        Ok(emergency)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppointmentRequest {
    pub patient_name: String,
    #[serde(default)]
    pub doctor_name: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Validate for AppointmentRequest {
    fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("patient_name", &self.patient_name);
        if self.scheduled_at <= now {
            errors.add("scheduled_at", "must be in the future");
        }
        if let Some(reason) = &self.reason {
            if reason.chars().count() > MAX_REASON_LEN {
                errors.add(
                    "reason",
                    format!("must be at most {} characters", MAX_REASON_LEN),
                );
            }
        }
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewMedicine {
    pub name: String,
    pub unit: String,
    pub stock: i64,
    pub expiry_date: NaiveDate,
    #[serde(default)]
    pub supplier: Option<String>,
}

impl Validate for NewMedicine {
    fn validate_at(&self, now: DateTime<Utc>) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.require("name", &self.name);
        errors.require("unit", &self.unit);
        if self.stock < 0 {
            errors.add("stock", "cannot be negative");
        }
        if self.expiry_date < now.date_naive() {
            errors.add("expiry_date", "is in the past");
        }
        errors.into_result()
    }
}

impl NewMedicine {
    pub fn into_medicine_at(self, now: DateTime<Utc>) -> Result<Medicine, ValidationErrors> {
        self.validate_at(now)?;
        let medicine = Medicine::new(self.name.trim(), self.unit.trim(), self.expiry_date)
            .with_stock(self.stock);
        Ok(match self.supplier {
            Some(supplier) => medicine.with_supplier(supplier),
            None => medicine,
        })
    }
}
