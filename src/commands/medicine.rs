use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use medidash_core::models::{Medicine, Record};
use medidash_core::validation::NewMedicine;

use crate::sync::RestClient;

#[derive(Args)]
pub struct MedicineCommand {
    #[command(subcommand)]
    pub command: MedicineSubcommand,
}

#[derive(Subcommand)]
pub enum MedicineSubcommand {
    /// Add a medicine to the inventory
    Add {
        /// Medicine name
        name: String,

        /// Dispensing unit (tablet, vial, bag, ...)
        #[arg(long)]
        unit: String,

        /// Units in stock
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        stock: i64,

        /// Expiry date (YYYY-MM-DD)
        #[arg(long)]
        expires: NaiveDate,

        /// Supplier name
        #[arg(long)]
        supplier: Option<String>,
    },
}

impl MedicineSubcommand {
    fn form(&self) -> NewMedicine {
        match self {
            MedicineSubcommand::Add {
                name,
                unit,
                stock,
                expires,
                supplier,
            } => NewMedicine {
                name: name.clone(),
                unit: unit.clone(),
                stock: *stock,
                expiry_date: *expires,
                supplier: supplier.clone(),
            },
        }
    }
}

impl MedicineCommand {
    pub async fn run(&self, rest: &RestClient) -> Result<(), Box<dyn std::error::Error>> {
        let medicine = self.command.form().into_medicine_at(Utc::now())?;
        rest.insert(Medicine::TABLE, &medicine).await?;
        println!(
            "Added {} ({} {} in stock, expires {})",
            medicine.name, medicine.stock, medicine.unit, medicine.expiry_date
        );
        Ok(())
    }
}
