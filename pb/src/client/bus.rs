//! Event bus - pub/sub fan-out for client events
//!
//! Built on tokio broadcast channels: emitters never block, subscribers
//! receive events in emit order, and a slow or panicking subscriber
//! cannot affect dispatch to the others.

use tokio::sync::broadcast;
use tracing::debug;

use crate::protocol::ClientEvent;

/// Default channel capacity (events)
///
/// Streaming tokens dominate the volume; this gives a comfortable buffer
/// before a lagging subscriber starts losing the oldest events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;

/// Central fan-out point for everything the client observes
///
/// The connection manager publishes decoded transport events here; the
/// persistence layer publishes synthetic refresh events; the session and
/// any UI subscribe.
pub struct EventBus {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Publish an event to all subscribers
    ///
    /// Fire-and-forget: no subscribers is fine, and a full channel drops
    /// the oldest events for the lagging subscriber only.
    pub fn emit(&self, event: ClientEvent) {
        debug!(event_type = event.event_type(), plan_id = ?event.plan_id(), "EventBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(ClientEvent::ConnectionStatus { connected: true });

        match rx.recv().await.unwrap() {
            ClientEvent::ConnectionStatus { connected } => assert!(connected),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.emit(ClientEvent::PlanListRefresh);
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_in_order() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(ClientEvent::ConnectionStatus { connected: false });
        bus.emit(ClientEvent::PlanListRefresh);

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(
                rx.recv().await.unwrap(),
                ClientEvent::ConnectionStatus { connected: false }
            ));
            assert!(matches!(rx.recv().await.unwrap(), ClientEvent::PlanListRefresh));
        }
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
