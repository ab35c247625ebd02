use clap::{Parser, Subcommand};
use medidash_core::plugins::PluginRegistry;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;
mod sync;

use commands::{
    AmbulanceCommand, AppointmentCommand, ConfigCommand, EmergencyCommand, ListCommand,
    MedicineCommand, PluginCommand, StatusCommand, WatchCommand,
};
use config::Config;
use db::{init_db, SettingsRepository};
use sync::RestClient;

#[derive(Parser)]
#[command(name = "medidash")]
#[command(version)]
#[command(about = "Hospital dashboard with live table sync", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep a table in sync and print status changes
    Watch(WatchCommand),

    /// List rows of a table with search, sort and paging
    List(ListCommand),

    /// Move a row to its next status
    Status(StatusCommand),

    /// Report emergencies
    Emergency(EmergencyCommand),

    /// Book appointments
    Appointment(AppointmentCommand),

    /// Dispatch ambulances
    Ambulance(AmbulanceCommand),

    /// Manage the medicine inventory
    Medicine(MedicineCommand),

    /// Turn dashboard plugins on and off
    Plugin(PluginCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medidash=info,medidash_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Save config path for init command
    let cli_config_path = cli.config.clone();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Watch(cmd)) => {
            let (rest, realtime) = sync::connect(&config)?;
            cmd.run(rest, realtime, &config).await?;
        }
        Some(Commands::List(cmd)) => {
            let rest = RestClient::from_config(&config.backend)?;
            cmd.run(&rest).await?;
        }
        Some(Commands::Status(cmd)) => {
            let rest = RestClient::from_config(&config.backend)?;
            cmd.run(&rest).await?;
        }
        Some(Commands::Emergency(cmd)) => {
            let rest = RestClient::from_config(&config.backend)?;
            cmd.run(&rest).await?;
        }
        Some(Commands::Appointment(cmd)) => {
            let rest = RestClient::from_config(&config.backend)?;
            cmd.run(&rest).await?;
        }
        Some(Commands::Ambulance(cmd)) => {
            let rest = RestClient::from_config(&config.backend)?;
            cmd.run(&rest).await?;
        }
        Some(Commands::Medicine(cmd)) => {
            let rest = RestClient::from_config(&config.backend)?;
            cmd.run(&rest).await?;
        }
        Some(Commands::Plugin(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            let mut registry = PluginRegistry::load(SettingsRepository::new(pool)).await?;
            cmd.run(&mut registry).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config, cli_config_path)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
