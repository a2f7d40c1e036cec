//! Broadcast channel for trigger notifications.
//!
//! # Guarantees
//!
//! - **At-most-once delivery**: Slow receivers may miss events
//! - **In-memory only**: Events are not persisted
//! - **No replay**: Lagged receivers get `RecvError::Lagged`
//!
//! Observers subscribe to everything or to a single [`Qualifier`]; filtering
//! happens on the receiving side so emitting stays a single `send`.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::trigger::{Qualifier, TriggerSupplies};

/// Default channel capacity for the trigger bus.
const DEFAULT_CAPACITY: usize = 1024;

/// A fired trigger as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    pub qualifier: Qualifier,
    pub payload: serde_json::Value,
    pub fired_at: DateTime<Utc>,
}

impl TriggerEvent {
    /// Build the event for supplies firing now.
    pub fn from_supplies(supplies: TriggerSupplies) -> Self {
        let (payload, qualifier) = supplies.into_parts();
        Self {
            qualifier,
            payload,
            fired_at: Utc::now(),
        }
    }
}

/// Notification channel that fired triggers are dispatched on.
///
/// # Example
///
/// ```ignore
/// let bus = TriggerBus::new();
/// let mut nightly = bus.subscribe_qualified(Qualifier::new("nightly"));
///
/// bus.emit(TriggerEvent::from_supplies(supplies));
///
/// let event = nightly.recv().await?;
/// ```
#[derive(Clone)]
pub struct TriggerBus {
    sender: broadcast::Sender<TriggerEvent>,
}

impl TriggerBus {
    /// Create a new bus with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new bus with the specified capacity.
    ///
    /// The capacity determines how many events can be buffered before
    /// slow receivers start lagging.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers (fire-and-forget).
    ///
    /// Returns the number of receivers that received the event.
    pub fn emit(&self, event: TriggerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to every trigger emitted after this call.
    pub fn subscribe(&self) -> TriggerReceiver {
        TriggerReceiver {
            inner: self.sender.subscribe(),
            qualifier: None,
        }
    }

    /// Subscribe to triggers carrying `qualifier` only.
    pub fn subscribe_qualified(&self, qualifier: Qualifier) -> TriggerReceiver {
        TriggerReceiver {
            inner: self.sender.subscribe(),
            qualifier: Some(qualifier),
        }
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for TriggerBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TriggerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Receiving half of a [`TriggerBus`] subscription.
pub struct TriggerReceiver {
    inner: broadcast::Receiver<TriggerEvent>,
    qualifier: Option<Qualifier>,
}

impl TriggerReceiver {
    fn accepts(&self, event: &TriggerEvent) -> bool {
        self.qualifier
            .as_ref()
            .map_or(true, |q| *q == event.qualifier)
    }

    /// Wait for the next matching event.
    pub async fn recv(&mut self) -> Result<TriggerEvent, RecvError> {
        loop {
            let event = self.inner.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Blocking variant of [`TriggerReceiver::recv`] for plain threads.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Result<TriggerEvent, RecvError> {
        loop {
            let event = self.inner.blocking_recv()?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Take the next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Result<TriggerEvent, TryRecvError> {
        loop {
            let event = self.inner.try_recv()?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }
}
