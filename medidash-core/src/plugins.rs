//! Dashboard plugin registry.
//!
//! Which plugins are switched on is persisted as one JSON object under
//! [`SETTINGS_KEY`] in a [`SettingsStore`]. The registry is an ordinary value
//! owned by whoever loads it.

use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};

pub const SETTINGS_KEY: &str = "medidash.plugins";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("settings store error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Key/value persistence for small settings blobs.
pub trait SettingsStore: Send + Sync {
    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>>;

    fn write<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }
}

impl SettingsStore for MemorySettings {
    fn read<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move { Ok(self.get(key)) })
    }

    fn write<'a>(&'a self, key: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.values
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(key.to_string(), value);
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PluginDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub default_enabled: bool,
}

pub const BUILTIN_PLUGINS: &[PluginDescriptor] = &[
    PluginDescriptor {
        id: "bed-occupancy",
        name: "Bed occupancy",
        description: "Live ward occupancy summary",
        default_enabled: true,
    },
    PluginDescriptor {
        id: "ambulance-tracker",
        name: "Ambulance tracker",
        description: "Fleet status and dispatch board",
        default_enabled: true,
    },
    PluginDescriptor {
        id: "inventory-alerts",
        name: "Inventory alerts",
        description: "Low stock and expiry warnings for medicines",
        default_enabled: true,
    },
    PluginDescriptor {
        id: "appointment-reminders",
        name: "Appointment reminders",
        description: "Upcoming appointments for the day",
        default_enabled: false,
    },
    PluginDescriptor {
        id: "report-export",
        name: "Report export",
        description: "Export generated reports",
        default_enabled: false,
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    #[serde(flatten)]
    pub descriptor: PluginDescriptor,
    pub enabled: bool,
}

pub struct PluginRegistry<S> {
    store: S,
    descriptors: &'static [PluginDescriptor],
    enabled: BTreeMap<&'static str, bool>,
}

impl<S: SettingsStore> PluginRegistry<S> {
    pub async fn load(store: S) -> Result<Self, PluginError> {
        Self::load_with(store, BUILTIN_PLUGINS).await
    }

    pub async fn load_with(
        store: S,
        descriptors: &'static [PluginDescriptor],
    ) -> Result<Self, PluginError> {
        let mut enabled: BTreeMap<&'static str, bool> = descriptors
            .iter()
            .map(|d| (d.id, d.default_enabled))
            .collect();

        if let Some(raw) = store.read(SETTINGS_KEY).await? {
            match serde_json::from_str::<HashMap<String, bool>>(&raw) {
                Ok(saved) => {
                    for (id, on) in saved {
                        match enabled.get_mut(id.as_str()) {
                            Some(slot) => *slot = on,
                            None => debug!(plugin = %id, "Ignoring saved state for unknown plugin"),
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Saved plugin settings are unreadable, using defaults");
                }
            }
        }

        Ok(Self {
            store,
            descriptors,
            enabled,
        })
    }

    pub fn list(&self) -> Vec<PluginInfo> {
        self.descriptors
            .iter()
            .map(|d| PluginInfo {
                descriptor: *d,
                enabled: self.enabled.get(d.id).copied().unwrap_or(d.default_enabled),
            })
            .collect()
    }

    pub fn is_enabled(&self, id: &str) -> Result<bool, PluginError> {
        self.enabled
            .get(id)
            .copied()
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))
    }

    pub async fn set_enabled(&mut self, id: &str, on: bool) -> Result<(), PluginError> {
        let slot = self
            .enabled
            .get_mut(id)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))?;
        *slot = on;
        self.persist().await
    }

    /// Flips a plugin and returns its new state.
    pub async fn toggle(&mut self, id: &str) -> Result<bool, PluginError> {
        let on = !self.is_enabled(id)?;
        self.set_enabled(id, on).await?;
        Ok(on)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn persist(&self) -> Result<(), PluginError> {
        let value = serde_json::to_string(&self.enabled)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.store.write(SETTINGS_KEY, value).await?;
        Ok(())
    }
}
