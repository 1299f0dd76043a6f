//! Process-wide roster change notifications.
//!
//! Stores publish a [`ChangeEvent`] for every roster mutation. Consumers (the
//! snapshot cache, SSE streams) open a [`Subscription`] on a named channel with
//! an event filter; dropping the subscription tears it down.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::Graduate;

/// Default buffer of undelivered events per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 1024;

/// Kind of roster mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("Unknown change kind: {}", other)),
        }
    }
}

/// One roster mutation.
///
/// `record` carries the affected row when the source knows it. A delete
/// without a record means "some rows were removed" and forces consumers that
/// keep a copy of the roster to refetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: Option<Graduate>,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn inserted(record: Graduate) -> Self {
        Self::new(ChangeKind::Insert, Some(record))
    }

    pub fn updated(record: Graduate) -> Self {
        Self::new(ChangeKind::Update, Some(record))
    }

    /// Bulk removal without row images.
    pub fn cleared() -> Self {
        Self::new(ChangeKind::Delete, None)
    }

    pub fn new(kind: ChangeKind, record: Option<Graduate>) -> Self {
        Self {
            kind,
            record,
            occurred_at: Utc::now(),
        }
    }
}

/// Which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventFilter {
    #[default]
    All,
    Only(ChangeKind),
}

impl EventFilter {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Self::All => true,
            Self::Only(kind) => event.kind == *kind,
        }
    }
}

impl FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "*" | "all" | "ALL" => Ok(Self::All),
            other => other.parse().map(Self::Only),
        }
    }
}

/// Failure to receive from a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The subscriber fell behind and missed this many events.
    #[error("Subscriber lagged behind by {0} events")]
    Lagged(u64),

    #[error("Change feed closed")]
    Closed,
}

/// Broadcast hub for roster changes. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event and returns how many subscribers will see it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        tracing::trace!(kind = event.kind.as_str(), "Publishing roster change");
        // No subscribers is not an error.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self, channel: impl Into<String>, filter: EventFilter) -> Subscription {
        let channel = channel.into();
        tracing::debug!(channel = %channel, ?filter, "Change subscription opened");
        Subscription {
            channel,
            filter,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Live subscription to the change feed.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    filter: EventFilter,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next event passing this subscription's filter.
    pub async fn recv(&mut self) -> Result<ChangeEvent, FeedError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(channel = %self.channel, missed, "Change subscriber lagged");
                    return Err(FeedError::Lagged(missed));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(FeedError::Closed),
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        tracing::debug!(channel = %self.channel, "Change subscription closed");
    }
}
