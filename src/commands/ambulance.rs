use clap::{Args, Subcommand};
use medidash_core::models::{Ambulance, Emergency, Record};
use medidash_core::rpc::AssignAmbulance;
use uuid::Uuid;

use crate::sync::RestClient;

#[derive(Args)]
pub struct AmbulanceCommand {
    #[command(subcommand)]
    pub command: AmbulanceSubcommand,
}

#[derive(Subcommand)]
pub enum AmbulanceSubcommand {
    /// Dispatch an ambulance to an emergency
    Assign {
        /// Emergency ID (UUID)
        emergency: Uuid,

        /// Ambulance ID (UUID)
        ambulance: Uuid,
    },
}

impl AmbulanceCommand {
    pub async fn run(&self, rest: &RestClient) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            AmbulanceSubcommand::Assign {
                emergency,
                ambulance,
            } => {
                let emergency: Emergency = rest.fetch_one(Emergency::TABLE, *emergency).await?;
                let ambulance: Ambulance = rest.fetch_one(Ambulance::TABLE, *ambulance).await?;
                let call = AssignAmbulance::for_units(&emergency, &ambulance)?;
                rest.call(&call).await?;
                println!(
                    "Ambulance {} dispatched to {} ({})",
                    ambulance.call_sign, emergency.patient_name, emergency.location
                );
                Ok(())
            }
        }
    }
}
