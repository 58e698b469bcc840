//! Status Bus - pub/sub for run status events
//!
//! Built on a tokio broadcast channel. The supervisor emits, any number of
//! consumers (terminal output, JSONL logger, auto-transition rule) subscribe.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::StatusEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Broadcast hub for [`StatusEvent`]s
#[derive(Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusBus {
    /// Create a new bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "StatusBus::new: creating status bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: with no subscribers the event is dropped.
    pub fn emit(&self, event: StatusEvent) {
        debug!(
            ticket_id = %event.ticket_id,
            running = event.running,
            iteration = event.iteration,
            "StatusBus::emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        debug!("StatusBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter bound to one ticket
    pub fn emitter_for(&self, ticket_id: impl Into<String>) -> StatusEmitter {
        let ticket_id = ticket_id.into();
        debug!(%ticket_id, "StatusBus::emitter_for: creating emitter");
        StatusEmitter {
            tx: self.tx.clone(),
            ticket_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle that emits status events for a single ticket
#[derive(Clone)]
pub struct StatusEmitter {
    tx: broadcast::Sender<StatusEvent>,
    ticket_id: String,
}

impl StatusEmitter {
    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    pub fn emit(&self, running: bool, iteration: u32) {
        debug!(ticket_id = %self.ticket_id, running, iteration, "StatusEmitter::emit");
        let _ = self.tx.send(StatusEvent::new(self.ticket_id.clone(), running, iteration));
    }

    /// Run started
    pub fn started(&self) {
        self.emit(true, 0);
    }

    /// Iteration marker seen
    pub fn iteration(&self, iteration: u32) {
        self.emit(true, iteration);
    }

    /// Run ended, was stopped or failed to spawn
    pub fn finished(&self, iteration: u32) {
        self.emit(false, iteration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = StatusBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(StatusEvent::new("t-1", true, 0));

        assert_eq!(rx.recv().await.unwrap(), StatusEvent::new("t-1", true, 0));
    }

    #[tokio::test]
    async fn test_emitter_sequence() {
        let bus = StatusBus::new(16);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("t-7");
        assert_eq!(emitter.ticket_id(), "t-7");

        emitter.started();
        emitter.iteration(1);
        emitter.finished(1);

        assert_eq!(rx.recv().await.unwrap(), StatusEvent::new("t-7", true, 0));
        assert_eq!(rx.recv().await.unwrap(), StatusEvent::new("t-7", true, 1));
        assert_eq!(rx.recv().await.unwrap(), StatusEvent::new("t-7", false, 1));
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_events() {
        let bus = StatusBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emitter_for("t").started();

        assert_eq!(a.recv().await.unwrap(), b.recv().await.unwrap());
    }

    #[tokio::test]
    async fn test_lagging_subscriber_loses_oldest() {
        let bus = StatusBus::new(2);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("t");

        emitter.started();
        emitter.iteration(1);
        emitter.iteration(2);
        emitter.finished(2);

        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(2))));
        assert_eq!(rx.recv().await.unwrap(), StatusEvent::new("t", true, 2));
        assert_eq!(rx.recv().await.unwrap(), StatusEvent::new("t", false, 2));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = StatusBus::default();
        bus.emitter_for("t").started();
        assert_eq!(bus.subscriber_count(), 0);
    }
}
