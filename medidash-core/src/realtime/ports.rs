//! Seams between the bridge and the outside world.
//!
//! The bridge never talks to a network or a UI directly. Fetching rows,
//! opening change channels and telling the user about lost live updates all
//! go through the types in this module, so tests can substitute simple fakes.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use super::error::{ChannelError, FetchError};
use super::state::ChannelEvent;

pub type FetchFuture<R> = BoxFuture<'static, Result<Vec<R>, FetchError>>;

/// Caller-supplied function returning the current rows of a table.
pub type FetchFn<R> = Arc<dyn Fn() -> FetchFuture<R> + Send + Sync>;

/// Wraps an async closure as a [`FetchFn`].
pub fn fetch_fn<R, F, Fut>(f: F) -> FetchFn<R>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<R>, FetchError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Where a provider delivers events for one channel.
pub type EventSink = mpsc::UnboundedSender<ChannelEvent>;

/// Opaque reference to a provider-side channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    id: u64,
    table: String,
}

impl ChannelRef {
    pub fn new(id: u64, table: impl Into<String>) -> Self {
        Self {
            id,
            table: table.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// A real-time backend able to stream change notifications for a table.
///
/// Both calls must return promptly: acknowledgements, errors and changes
/// arrive later through the sink as [`ChannelEvent`]s.
pub trait ChannelProvider: Send + Sync + 'static {
    fn subscribe(&self, table: &str, sink: EventSink) -> Result<ChannelRef, ChannelError>;

    fn unsubscribe(&self, channel: ChannelRef) -> Result<(), ChannelError>;
}

impl<P: ChannelProvider> ChannelProvider for Arc<P> {
    fn subscribe(&self, table: &str, sink: EventSink) -> Result<ChannelRef, ChannelError> {
        (**self).subscribe(table, sink)
    }

    fn unsubscribe(&self, channel: ChannelRef) -> Result<(), ChannelError> {
        (**self).unsubscribe(channel)
    }
}

/// User-facing notices raised by the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    LiveUpdatesUnavailable { table: String },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Default notifier: logs notices.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::LiveUpdatesUnavailable { table } => {
                tracing::warn!("Live updates for '{}' are unavailable, showing last known data", table);
            }
        }
    }
}
