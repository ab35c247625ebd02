use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use medidash_core::rpc::BookAppointment;
use medidash_core::validation::AppointmentRequest;

use crate::sync::RestClient;

#[derive(Args)]
pub struct AppointmentCommand {
    #[command(subcommand)]
    pub command: AppointmentSubcommand,
}

#[derive(Subcommand)]
pub enum AppointmentSubcommand {
    /// Book an appointment
    Book {
        /// Patient name
        patient: String,

        /// When, as RFC 3339 (e.g. 2025-03-01T09:30:00Z)
        #[arg(long)]
        at: DateTime<Utc>,

        /// Doctor to see
        #[arg(long)]
        doctor: Option<String>,

        /// Reason for the visit
        #[arg(long)]
        reason: Option<String>,
    },
}

impl AppointmentSubcommand {
    fn request(&self) -> AppointmentRequest {
        match self {
            AppointmentSubcommand::Book {
                patient,
                at,
                doctor,
                reason,
            } => AppointmentRequest {
                patient_name: patient.clone(),
                doctor_name: doctor.clone(),
                scheduled_at: *at,
                reason: reason.clone(),
            },
        }
    }
}

impl AppointmentCommand {
    pub async fn run(&self, rest: &RestClient) -> Result<(), Box<dyn std::error::Error>> {
        let call = BookAppointment::from_request(self.command.request())?;
        let id = rest.call(&call).await?;
        println!(
            "Booked appointment {} for {} at {}",
            id,
            call.patient_name,
            call.scheduled_at.format("%Y-%m-%d %H:%M")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        appointment: AppointmentCommand,
    }

    #[test]
    fn test_book_args() {
        let cli = Cli::parse_from([
            "appointment", "book", "Priya Patel", "--at", "2031-05-01T09:30:00Z", "--doctor",
            "Dr. Okafor",
        ]);
        let request = cli.appointment.command.request();
        assert_eq!(request.doctor_name.as_deref(), Some("Dr. Okafor"));
        assert!(BookAppointment::from_request(request).is_ok());
    }

    #[test]
    fn test_past_appointment_rejected() {
        let cli = Cli::parse_from(["appointment", "book", "Priya", "--at", "2001-01-01T00:00:00Z"]);
        let err = BookAppointment::from_request(cli.appointment.command.request()).unwrap_err();
        assert!(err.has("scheduled_at"));
    }

    #[test]
    fn test_bad_timestamp_is_a_parse_error() {
        assert!(Cli::try_parse_from(["appointment", "book", "Priya", "--at", "tomorrow"]).is_err());
    }
}
