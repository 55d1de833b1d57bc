//! Event Bus
//!
//! Decouples orchestrator state changes from whoever renders them.
//! The orchestrator and the status tracker publish, observers subscribe.

use tokio::sync::broadcast;

/// Broadcasts events to every live subscriber
///
/// # Type Parameters
/// * `E` - Event type (must be Clone for broadcasting)
pub struct EventBus<E> {
    tx: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    /// Create a new EventBus with the specified channel capacity
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of events to buffer per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// A lagging subscriber loses its oldest buffered events.
    ///
    /// # Returns
    /// Number of subscribers that received the event
    pub fn publish(&self, event: E) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(100)
    }
}
