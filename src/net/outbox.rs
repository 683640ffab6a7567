//! Per-connection outbound queues
//!
//! The socket transport owns the receiving half of each queue and writes
//! frames to the wire; the room only pushes into the sending half, so a slow
//! socket never blocks a tick.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::mpsc;

use crate::game::state::ConnectionId;
use crate::metrics::Metrics;
use crate::net::broadcast::{Outbound, Payload};

pub type OutboxSender = mpsc::UnboundedSender<Payload>;
pub type OutboxReceiver = mpsc::UnboundedReceiver<Payload>;

/// Create a queue for a new connection
pub fn channel() -> (OutboxSender, OutboxReceiver) {
    mpsc::unbounded_channel()
}

pub struct OutboxRegistry {
    senders: HashMap<ConnectionId, OutboxSender>,
    metrics: Arc<Metrics>,
}

impl OutboxRegistry {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            senders: HashMap::new(),
            metrics,
        }
    }

    pub fn register(&mut self, connection_id: ConnectionId, sender: OutboxSender) {
        self.senders.insert(connection_id, sender);
    }

    pub fn unregister(&mut self, connection_id: ConnectionId) -> bool {
        self.senders.remove(&connection_id).is_some()
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.senders.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl Outbound for OutboxRegistry {
    fn send(&mut self, connection_id: ConnectionId, payload: Payload) -> bool {
        let Some(sender) = self.senders.get(&connection_id) else {
            return false;
        };
        let len = payload.len();
        if sender.send(payload).is_err() {
            // Receiver gone: the transport already closed the socket. The
            // disconnect event will tear the rest down at the next tick.
            tracing::debug!("Outbox for connection {} is closed", connection_id);
            self.senders.remove(&connection_id);
            return false;
        }
        self.metrics.record_sent(len);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_send_reaches_receiver() {
        let metrics = Arc::new(Metrics::new());
        let mut outbox = OutboxRegistry::new(metrics.clone());
        let (tx, mut rx) = channel();
        outbox.register(1, tx);

        assert!(outbox.send(1, Arc::from(&b"hello"[..])));
        let received = rx.try_recv().unwrap();
        assert_eq!(&received[..], b"hello");
        assert_eq!(metrics.messages_sent.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.bytes_sent.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_send_to_unknown_connection() {
        let mut outbox = OutboxRegistry::new(Arc::new(Metrics::new()));
        assert!(!outbox.send(9, Arc::from(&b"x"[..])));
    }

    #[test]
    fn test_closed_receiver_unregisters() {
        let mut outbox = OutboxRegistry::new(Arc::new(Metrics::new()));
        let (tx, rx) = channel();
        outbox.register(1, tx);
        drop(rx);

        assert!(!outbox.send(1, Arc::from(&b"x"[..])));
        assert!(!outbox.contains(1));
    }

    #[tokio::test]
    async fn test_async_receiver() {
        let mut outbox = OutboxRegistry::new(Arc::new(Metrics::new()));
        let (tx, mut rx) = channel();
        outbox.register(3, tx);
        outbox.send(3, Arc::from(&b"abc"[..]));

        let received = rx.recv().await.unwrap();
        assert_eq!(&received[..], b"abc");
    }

    #[test]
    fn test_unregister_closes_receiver() {
        let mut outbox = OutboxRegistry::new(Arc::new(Metrics::new()));
        let (tx, mut rx) = channel();
        outbox.register(4, tx);
        outbox.send(4, Arc::from(&b"last"[..]));
        assert!(outbox.unregister(4));

        let received = tokio_test::block_on(rx.recv());
        assert_eq!(received.as_deref(), Some(&b"last"[..]));
        assert!(tokio_test::block_on(rx.recv()).is_none());
    }
}
