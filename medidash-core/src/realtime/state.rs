//! Per-channel connection state machine.
//!
//! ```text
//! connecting --subscribed--> live
//! connecting --error/timeout/close--> degraded
//! live       --error/timeout/close--> degraded
//! degraded   --subscribed--> live        (provider rejoined)
//! any        --close()--> closed         (terminal)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Connection health of a channel as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelStatus {
    Connecting,
    Live,
    Degraded,
    Closed,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Connecting => write!(f, "connecting"),
            ChannelStatus::Live => write!(f, "live"),
            ChannelStatus::Degraded => write!(f, "degraded"),
            ChannelStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Status callback values reported by a channel provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSignal {
    Subscribed,
    ChannelError,
    TimedOut,
    Closed,
}

/// Kind of row change carried by a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Insert => write!(f, "insert"),
            ChangeKind::Update => write!(f, "update"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(ChangeKind::Insert),
            "update" => Ok(ChangeKind::Update),
            "delete" => Ok(ChangeKind::Delete),
            _ => Err(format!("Unknown change type '{}'", s)),
        }
    }
}

/// Everything a provider can tell the bridge about a channel.
///
/// Change payloads are deliberately not carried: the bridge always refetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Status(ChannelSignal),
    Change { table: String, kind: ChangeKind },
}

impl ChannelEvent {
    pub fn change(table: impl Into<String>, kind: ChangeKind) -> Self {
        ChannelEvent::Change {
            table: table.into(),
            kind,
        }
    }
}

/// What the driver has to do after applying an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Nothing,
    StatusChanged,
    Refetch,
    /// Status went to degraded; `notify` is set only the first time.
    Degraded { notify: bool },
    /// Back to live after being degraded; changes may have been missed.
    Recovered,
}

#[derive(Debug, Clone)]
pub struct ChannelState {
    table: String,
    status: ChannelStatus,
    changed_at: DateTime<Utc>,
    degraded_notified: bool,
}

impl ChannelState {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            status: ChannelStatus::Connecting,
            changed_at: Utc::now(),
            degraded_notified: false,
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn changed_at(&self) -> DateTime<Utc> {
        self.changed_at
    }

    pub fn apply(&mut self, event: &ChannelEvent) -> Effect {
        if self.status == ChannelStatus::Closed {
            return Effect::Nothing;
        }

        match event {
            ChannelEvent::Change { table, .. } => {
                if *table == self.table {
                    Effect::Refetch
                } else {
                    Effect::Nothing
                }
            }
            ChannelEvent::Status(ChannelSignal::Subscribed) => match self.status {
                ChannelStatus::Connecting => {
                    self.set(ChannelStatus::Live);
                    Effect::StatusChanged
                }
                ChannelStatus::Degraded => {
                    self.set(ChannelStatus::Live);
                    Effect::Recovered
                }
                _ => Effect::Nothing,
            },
            ChannelEvent::Status(
                ChannelSignal::ChannelError | ChannelSignal::TimedOut | ChannelSignal::Closed,
            ) => {
                if self.status == ChannelStatus::Degraded {
                    return Effect::Nothing;
                }
                self.set(ChannelStatus::Degraded);
                let notify = !self.degraded_notified;
                self.degraded_notified = true;
                Effect::Degraded { notify }
            }
        }
    }

    /// Moves to the terminal state. Returns false if already closed.
    pub fn close(&mut self) -> bool {
        if self.status == ChannelStatus::Closed {
            return false;
        }
        self.set(ChannelStatus::Closed);
        true
    }

    fn set(&mut self, status: ChannelStatus) {
        self.status = status;
        self.changed_at = Utc::now();
    }
}
