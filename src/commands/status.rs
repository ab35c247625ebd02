use std::str::FromStr;

use clap::Args;
use medidash_core::models::{Ambulance, Appointment, Bed, Emergency, Lifecycle, Tracked};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::Entity;
use crate::sync::RestClient;

#[derive(Args)]
pub struct StatusCommand {
    /// Table holding the row
    #[arg(value_enum)]
    pub entity: Entity,

    /// Row id (UUID)
    pub id: Uuid,

    /// Status to move to
    pub next: String,
}

impl StatusCommand {
    pub async fn run(&self, rest: &RestClient) -> Result<(), Box<dyn std::error::Error>> {
        match self.entity {
            Entity::Emergencies => self.advance::<Emergency>(rest).await,
            Entity::Ambulances => self.advance::<Ambulance>(rest).await,
            Entity::Beds => self.advance::<Bed>(rest).await,
            Entity::Appointments => self.advance::<Appointment>(rest).await,
            Entity::Medicines | Entity::Reports => {
                Err(format!("{} have no status to change", self.entity.table()).into())
            }
        }
    }

    async fn advance<R>(&self, rest: &RestClient) -> Result<(), Box<dyn std::error::Error>>
    where
        R: Tracked + DeserializeOwned,
        R::Status: FromStr<Err = String>,
    {
        let row: R = rest.fetch_one(R::TABLE, self.id).await?;
        let current = row.status();
        let next = plan_transition(current, &self.next)?;
        rest.update_status(R::TABLE, self.id, &next.to_string()).await?;
        println!("{} {}: {} -> {}", R::TABLE, self.id, current, next);
        Ok(())
    }
}

/// Parses `next` and checks it is reachable from `current`.
fn plan_transition<S>(current: S, next: &str) -> Result<S, String>
where
    S: Lifecycle + FromStr<Err = String>,
{
    let next: S = next.parse()?;
    current.transition(next).map_err(|e| {
        let options: Vec<String> = current.allowed_next().iter().map(|s| s.to_string()).collect();
        if options.is_empty() {
            format!("{} ('{}' is final)", e, current)
        } else {
            format!("{} (allowed: {})", e, options.join(", "))
        }
    })
}
