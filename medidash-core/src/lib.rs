//! MediDash Core Library
//!
//! Records, table views, validation and the real-time sync bridge shared by
//! MediDash front ends.

pub mod cache;
pub mod models;
pub mod plugins;
pub mod realtime;
pub mod rpc;
pub mod table;
pub mod validation;

pub use cache::{CacheEntry, CacheKey, MemoryCache, QueryCache};
pub use models::{
    Ambulance, AmbulanceStatus, Appointment, AppointmentStatus, Bed, BedStatus, Emergency,
    EmergencyStatus, Lifecycle, Medicine, Record, Report, Severity, Tracked, TransitionError,
};
pub use plugins::{
    MemorySettings, PluginDescriptor, PluginError, PluginInfo, PluginRegistry, SettingsStore,
    StoreError, BUILTIN_PLUGINS,
};
pub use realtime::{
    BridgeConfig, BridgeError, BridgeHandle, ChannelError, ChannelProvider, FetchError,
    SyncBridge, SyncStatus,
};
pub use rpc::{AssignAmbulance, BookAppointment, RemoteProcedure};
pub use table::{CellValue, Column, Page, SortDirection, TableError, TableQuery, TableView, Tabular};
pub use validation::{FieldError, Validate, ValidationErrors};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
