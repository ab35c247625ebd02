use clap::{Args, Subcommand};
use medidash_core::models::{Emergency, Record, Severity};
use medidash_core::validation::NewEmergency;

use crate::sync::RestClient;

#[derive(Args)]
pub struct EmergencyCommand {
    #[command(subcommand)]
    pub command: EmergencySubcommand,
}

#[derive(Subcommand)]
pub enum EmergencySubcommand {
    /// Report a new emergency
    Create {
        /// Patient name
        patient: String,

        /// Where the patient is
        #[arg(long)]
        location: String,

        /// Contact phone number
        #[arg(long)]
        phone: Option<String>,

        /// Severity (low, moderate, high, critical)
        #[arg(long, default_value = "moderate")]
        severity: Severity,

        /// Free-text description
        #[arg(long)]
        description: Option<String>,
    },
}

impl EmergencySubcommand {
    fn form(&self) -> NewEmergency {
        match self {
            EmergencySubcommand::Create {
                patient,
                location,
                phone,
                severity,
                description,
            } => NewEmergency {
                patient_name: patient.clone(),
                location: location.clone(),
                phone: phone.clone(),
                severity: *severity,
                description: description.clone(),
            },
        }
    }
}

impl EmergencyCommand {
    pub async fn run(&self, rest: &RestClient) -> Result<(), Box<dyn std::error::Error>> {
        let emergency = self.command.form().into_emergency()?;
        rest.insert(Emergency::TABLE, &emergency).await?;
        println!(
            "Reported emergency {} ({}) at {}",
            emergency.id, emergency.severity, emergency.location
        );
        Ok(())
    }
}
