use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use clap::Args;
use medidash_core::cache::MemoryCache;
use medidash_core::models::{Ambulance, Appointment, Bed, Emergency, Medicine, Record, Report};
use medidash_core::realtime::{ChannelStatus, SyncBridge, SyncStatus};
use serde::de::DeserializeOwned;

use super::Entity;
use crate::config::Config;
use crate::sync::{RealtimeClient, RestClient};

#[derive(Args)]
pub struct WatchCommand {
    /// Table to keep in sync
    #[arg(value_enum)]
    pub entity: Entity,

    /// Cache key scoping this view (defaults to the table name)
    #[arg(long)]
    pub key: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub seconds: Option<u64>,
}

impl WatchCommand {
    pub async fn run(
        &self,
        rest: RestClient,
        realtime: RealtimeClient,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let rest = Arc::new(rest);
        match self.entity {
            Entity::Emergencies => self.watch::<Emergency>(rest, realtime, config).await,
            Entity::Ambulances => self.watch::<Ambulance>(rest, realtime, config).await,
            Entity::Beds => self.watch::<Bed>(rest, realtime, config).await,
            Entity::Appointments => self.watch::<Appointment>(rest, realtime, config).await,
            Entity::Medicines => self.watch::<Medicine>(rest, realtime, config).await,
            Entity::Reports => self.watch::<Report>(rest, realtime, config).await,
        }
    }

    async fn watch<R>(
        &self,
        rest: Arc<RestClient>,
        realtime: RealtimeClient,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>>
    where
        R: Record + DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let cache = Arc::new(MemoryCache::<R>::new());
        let bridge = SyncBridge::new(realtime, cache.clone())
            .with_config(config.realtime.bridge_config());

        let key = self.key.clone().unwrap_or_else(|| R::TABLE.to_string());
        let handle = bridge.attach(R::TABLE, key, rest.fetcher::<R>(R::TABLE))?;
        let mut status = handle.watch_status();
        handle.loaded().await;

        let row_count = || bridge.rows(&handle).map(|rows| rows.len()).unwrap_or(0);
        println!("{}", describe(R::TABLE, &status.borrow_and_update(), row_count()));

        let deadline = async {
            match self.seconds {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    println!("{}", describe(R::TABLE, &current, row_count()));
                    if current.status == ChannelStatus::Closed {
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, detaching");
                    break;
                }
                _ = &mut deadline => break,
            }
        }

        bridge.detach(&handle);
        Ok(())
    }
}

/// One status line for the watch output.
fn describe(table: &str, status: &SyncStatus, rows: usize) -> String {
    let mut line = format!(
        "[{}] {} {}: {} rows",
        Local::now().format("%H:%M:%S"),
        table,
        status.status,
        rows
    );
    if let Some(updated) = status.last_updated {
        line.push_str(&format!(
            ", updated {}",
            updated.with_timezone(&Local).format("%H:%M:%S")
        ));
    }
    if let Some(reason) = &status.unavailable {
        line.push_str(&format!(" (unavailable: {})", reason));
    } else if let Some(error) = &status.error {
        line.push_str(&format!(" (last error: {})", error));
    }
    line
}
