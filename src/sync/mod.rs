//! Backend access for the dashboard.
//!
//! - [`RestClient`] reads and writes table rows and calls server functions.
//! - [`RealtimeClient`] is the change-channel provider behind the sync bridge.

pub mod realtime;
pub mod rest;

pub use realtime::{RealtimeClient, RealtimeOptions};
pub use rest::{RestClient, RestError};

use crate::config::Config;

/// Both clients, built from config. Must be called inside a tokio runtime.
pub fn connect(config: &Config) -> Result<(RestClient, RealtimeClient), RestError> {
    let rest = RestClient::from_config(&config.backend)?;
    let options = RealtimeOptions::new(rest.build_ws_url(), rest.schema())
        .with_heartbeat(config.realtime.heartbeat())
        .with_join_timeout(config.realtime.join_timeout())
        .with_reconnect_delay(config.realtime.reconnect_delay());
    let realtime = RealtimeClient::connect(options);
    Ok((rest, realtime))
}
