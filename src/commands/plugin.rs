use clap::{Args, Subcommand};
use medidash_core::plugins::{PluginInfo, PluginRegistry, SettingsStore};

use super::OutputFormat;

#[derive(Args)]
pub struct PluginCommand {
    #[command(subcommand)]
    pub command: PluginSubcommand,
}

#[derive(Subcommand)]
pub enum PluginSubcommand {
    /// List dashboard plugins and whether they are on
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Turn a plugin on
    Enable {
        /// Plugin id
        id: String,
    },

    /// Turn a plugin off
    Disable {
        /// Plugin id
        id: String,
    },

    /// Flip a plugin on or off
    Toggle {
        /// Plugin id
        id: String,
    },
}

impl PluginCommand {
    pub async fn run<S: SettingsStore>(
        &self,
        registry: &mut PluginRegistry<S>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            PluginSubcommand::List { format } => match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&registry.list())?);
                }
                OutputFormat::Text => print!("{}", format_plugins(&registry.list())),
            },
            PluginSubcommand::Enable { id } => {
                registry.set_enabled(id, true).await?;
                println!("Enabled {}", id);
            }
            PluginSubcommand::Disable { id } => {
                registry.set_enabled(id, false).await?;
                println!("Disabled {}", id);
            }
            PluginSubcommand::Toggle { id } => {
                let on = registry.toggle(id).await?;
                println!("{} is now {}", id, if on { "enabled" } else { "disabled" });
            }
        }
        Ok(())
    }
}

fn format_plugins(plugins: &[PluginInfo]) -> String {
    let width = plugins
        .iter()
        .map(|p| p.descriptor.id.len())
        .max()
        .unwrap_or(0);
    plugins
        .iter()
        .map(|p| {
            format!(
                "[{}] {:<width$}  {}\n",
                if p.enabled { "x" } else { " " },
                p.descriptor.id,
                p.descriptor.description,
                width = width
            )
        })
        .collect()
}
