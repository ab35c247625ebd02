use clap::{Args, Subcommand};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::OutputFormat;
use crate::config::Config;

#[derive(Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Initialize configuration file
    Init,
}

const DEFAULT_CONFIG: &str = r#"# medidash configuration

# Path to the local SQLite database (plugin settings)
# database_path: ~/.local/share/medidash/medidash.db

backend:
  # Project URL of the hosted backend
  # url: https://your-project.example.co
  # Anon key (or set MEDIDASH_API_KEY)
  # api_key: ...
  schema: public

realtime:
  # Delay between opening a view and subscribing to changes
  debounce_ms: 1000
  # Fetch attempts before giving up on a transient failure
  retry_attempts: 3
  retry_delay_ms: 1000
  join_timeout_secs: 10
  heartbeat_secs: 30
"#;

impl ConfigCommand {
    pub fn run(
        &self,
        config: &Config,
        cli_config_path: Option<PathBuf>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!(
                            "backend.url: {}",
                            config.backend_url.value.as_deref().unwrap_or("(not set)")
                        );
                        println!("  source: {}", config.backend_url.source);
                        println!(
                            "backend.api_key: {}",
                            if config.backend.api_key.is_some() {
                                "(set)"
                            } else {
                                "(not set)"
                            }
                        );
                        println!("backend.schema: {}", config.backend.schema);
                        println!();

                        let realtime = &config.realtime;
                        println!("realtime.debounce_ms: {}", realtime.debounce_ms);
                        println!("realtime.retry_attempts: {}", realtime.retry_attempts);
                        println!("realtime.retry_delay_ms: {}", realtime.retry_delay_ms);
                        println!("realtime.join_timeout_secs: {}", realtime.join_timeout_secs);
                        println!("realtime.heartbeat_secs: {}", realtime.heartbeat_secs);
                    }
                }
                Ok(())
            }

            ConfigSubcommand::Init => {
                let config_path = cli_config_path.unwrap_or_else(Config::default_config_path);

                if write_default_config(&config_path)? {
                    println!("Created config file: {}", config_path.display());
                    println!("\nEdit this file to customize your settings.");
                } else {
                    println!("Config file already exists: {}", config_path.display());
                    println!("Use 'medidash config show' to view current configuration.");
                }
                Ok(())
            }
        }
    }
}

/// Writes the default config unless a file already exists. Returns true if written.
fn write_default_config(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(path)?;
    file.write_all(DEFAULT_CONFIG.as_bytes())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_writes_loadable_config() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("medidash").join("config.yaml");

        assert!(write_default_config(&path).unwrap());
        assert!(!write_default_config(&path).unwrap());

        let config = Config::load(Some(path.clone())).unwrap();
        assert_eq!(config.config_file, Some(path));
        assert_eq!(config.backend.schema, "public");
        assert_eq!(config.realtime.debounce_ms, 1000);
    }
}
