//! Real-time sync bridge.
//!
//! Keeps a local query cache consistent with a remote table:
//! 1. `attach` fetches the rows immediately and stores them in the cache
//! 2. After a short debounce, one change channel is opened for the
//!    (table, cache key) pair, replacing any earlier one
//! 3. Every insert/update/delete marks the entry stale and refetches;
//!    bursts are coalesced into the refetch already in flight
//! 4. Channel trouble degrades the status but keeps the cached rows
//! 5. `detach` cancels the debounce or unsubscribes, and never fails

mod bridge;
mod error;
mod ports;
pub mod protocol;
mod retry;
mod state;

pub use bridge::{
    BridgeConfig, BridgeHandle, ChannelKey, SyncBridge, SyncStatus, DEFAULT_DEBOUNCE,
};
pub use error::{BridgeError, ChannelError, FetchError};
pub use ports::{
    fetch_fn, ChannelProvider, ChannelRef, EventSink, FetchFn, FetchFuture, Notice, Notifier,
    TracingNotifier,
};
pub use retry::{fetch_with_retry, FetchOutcome, RetryPolicy};
pub use state::{ChangeKind, ChannelEvent, ChannelSignal, ChannelState, ChannelStatus, Effect};
