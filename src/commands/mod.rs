mod ambulance;
mod appointment;
mod config_cmd;
mod emergency;
mod list;
mod medicine;
mod plugin;
mod status;
mod watch;

pub use ambulance::AmbulanceCommand;
pub use appointment::AppointmentCommand;
pub use config_cmd::ConfigCommand;
pub use emergency::EmergencyCommand;
pub use list::ListCommand;
pub use medicine::MedicineCommand;
pub use plugin::PluginCommand;
pub use status::StatusCommand;
pub use watch::WatchCommand;

use clap::ValueEnum;
use medidash_core::models::{Ambulance, Appointment, Bed, Emergency, Medicine, Record, Report};

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Dashboard tables reachable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Entity {
    Emergencies,
    Ambulances,
    Beds,
    Appointments,
    Medicines,
    Reports,
}

impl Entity {
    pub fn table(&self) -> &'static str {
        match self {
            Entity::Emergencies => Emergency::TABLE,
            Entity::Ambulances => Ambulance::TABLE,
            Entity::Beds => Bed::TABLE,
            Entity::Appointments => Appointment::TABLE,
            Entity::Medicines => Medicine::TABLE,
            Entity::Reports => Report::TABLE,
        }
    }
}
