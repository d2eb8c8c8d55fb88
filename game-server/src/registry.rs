//! The live set of outbound channels, one per connection.
//!
//! Every member is the sending side of a bounded channel whose receiver is drained into the socket
//! by the writer task of that connection. A response is encoded once into [`Bytes`] and the buffer is
//! shared by all recipients.
//!
//! Delivery never waits on a client: a member whose channel is closed (writer gone, broken pipe) or
//! full (client too slow) counts as failed and is removed after the broadcast is done.
//!
//! ```text
//! coordinator A: lock session -> mutate -> dispatch() -> unlock session -> broadcast -> drop permit
//! coordinator B:                 lock session (waits) ...........-> mutate -> dispatch() (waits)
//! ```
//!
//! The [`Dispatch`] permit orders broadcast groups the same way the session lock orders mutations,
//! while the session itself is never locked during delivery. Membership uses its own lock, so joins
//! and leaves are never held up by a delivery.

use crate::ConnectionId;
use bytes::Bytes;
use protocol::Response;
use std::collections::HashMap;
use tokio::sync::mpsc::Sender;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, MutexGuard};

/// What happened during one delivery.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of members that got the message queued.
    pub delivered: usize,
    /// Members that failed and were removed.
    pub dropped: Vec<ConnectionId>,
}

/// The response as it goes over the wire, newline included.
pub fn encode_line(response: &Response) -> Bytes {
    Bytes::from(format!("{response}\n"))
}

#[derive(Default)]
pub struct ConnectionRegistry {
    members: Mutex<HashMap<ConnectionId, Sender<Bytes>>>,
    dispatch_order: Mutex<()>,
}

impl ConnectionRegistry {
    pub fn new() -> ConnectionRegistry {
        ConnectionRegistry::default()
    }

    /// Registers the outbound channel of a new connection.
    pub async fn add(&self, connection: ConnectionId, sender: Sender<Bytes>) {
        self.members.lock().await.insert(connection, sender);
    }

    /// Removes a member. Removing an absent member is a no-op, returns whether it was present.
    pub async fn remove(&self, connection: ConnectionId) -> bool {
        self.members.lock().await.remove(&connection).is_some()
    }

    pub async fn contains(&self, connection: ConnectionId) -> bool {
        self.members.lock().await.contains_key(&connection)
    }

    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Waits for the right to deliver. Acquire it while still holding the session lock.
    pub async fn dispatch(&self) -> Dispatch<'_> {
        Dispatch {
            registry: self,
            _order: self.dispatch_order.lock().await,
        }
    }

    /// Delivers to every current member.
    pub async fn broadcast(&self, response: &Response) -> DeliveryReport {
        self.dispatch().await.broadcast(response).await
    }

    /// Delivers to a single member.
    pub async fn send_to(&self, connection: ConnectionId, response: &Response) -> bool {
        self.dispatch().await.send_to(connection, response).await
    }

    async fn drop_members(&self, failed: &[ConnectionId]) {
        if failed.is_empty() {
            return;
        }
        let mut members = self.members.lock().await;
        for connection in failed {
            members.remove(connection);
        }
    }
}

/// The permit to deliver one group of messages. Released on drop.
pub struct Dispatch<'a> {
    registry: &'a ConnectionRegistry,
    _order: MutexGuard<'a, ()>,
}

impl Dispatch<'_> {
    /// Delivers to a snapshot of the members taken now. Connections added later do not get this
    /// message, failed members are removed afterwards.
    pub async fn broadcast(&self, response: &Response) -> DeliveryReport {
        let line = encode_line(response);
        let snapshot: Vec<(ConnectionId, Sender<Bytes>)> = self
            .registry
            .members
            .lock()
            .await
            .iter()
            .map(|(connection, sender)| (*connection, sender.clone()))
            .collect();

        let mut report = DeliveryReport::default();
        for (connection, sender) in snapshot {
            if try_deliver(connection, &sender, line.clone()) {
                report.delivered += 1;
            } else {
                report.dropped.push(connection);
            }
        }
        self.registry.drop_members(&report.dropped).await;

        tracing::debug!(
            response = %response,
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Broadcast."
        );
        report
    }

    /// Delivers to one member. Returns false if it is not registered or the delivery failed.
    pub async fn send_to(&self, connection: ConnectionId, response: &Response) -> bool {
        let sender = self.registry.members.lock().await.get(&connection).cloned();
        let Some(sender) = sender else {
            tracing::debug!(%connection, response = %response, "Send to unregistered connection.");
            return false;
        };
        if try_deliver(connection, &sender, encode_line(response)) {
            tracing::debug!(%connection, response = %response, "Sent.");
            true
        } else {
            self.registry.drop_members(&[connection]).await;
            false
        }
    }
}

fn try_deliver(connection: ConnectionId, sender: &Sender<Bytes>, line: Bytes) -> bool {
    match sender.try_send(line) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(%connection, "Outbound channel full, client too slow.");
            false
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!(%connection, "Outbound channel closed.");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::PlayerSlot;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn broadcast_reaches_every_member() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for id in 0..3 {
            let (sender, receiver) = mpsc::channel(4);
            registry.add(ConnectionId(id), sender).await;
            receivers.push(receiver);
        }

        let report = registry.broadcast(&Response::Draw).await;
        assert_eq!(report.delivered, 3);
        assert!(report.dropped.is_empty());
        for receiver in &mut receivers {
            assert_eq!(receiver.recv().await, Some(Bytes::from_static(b"Draw\n")));
        }
    }

    #[tokio::test]
    async fn failed_members_are_removed_without_stopping_the_rest() {
        let registry = ConnectionRegistry::new();
        let (closed_sender, closed_receiver) = mpsc::channel(4);
        let (full_sender, _full_receiver) = mpsc::channel(1);
        let (healthy_sender, mut healthy_receiver) = mpsc::channel(4);
        drop(closed_receiver);
        full_sender.try_send(Bytes::from_static(b"stale\n")).unwrap();

        registry.add(ConnectionId(1), closed_sender).await;
        registry.add(ConnectionId(2), full_sender).await;
        registry.add(ConnectionId(3), healthy_sender).await;

        let mut report = registry.broadcast(&Response::PlayerExited).await;
        report.dropped.sort();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![ConnectionId(1), ConnectionId(2)]);
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(ConnectionId(3)).await);
        assert_eq!(
            healthy_receiver.recv().await,
            Some(Bytes::from_static(b"Player Exits\n"))
        );
    }

    #[tokio::test]
    async fn send_to_only_reaches_the_target() {
        let registry = ConnectionRegistry::new();
        let (target_sender, mut target) = mpsc::channel(4);
        let (other_sender, mut other) = mpsc::channel(4);
        registry.add(ConnectionId(1), target_sender).await;
        registry.add(ConnectionId(2), other_sender).await;

        assert!(
            registry
                .send_to(ConnectionId(1), &Response::MoveRejected(PlayerSlot::One))
                .await
        );
        assert_eq!(
            target.recv().await,
            Some(Bytes::from_static(b"Player 1 failed to press the Button\n"))
        );
        assert!(other.try_recv().is_err());
        assert!(!registry.send_to(ConnectionId(9), &Response::SlotsFull).await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (sender, _receiver) = mpsc::channel(1);
        registry.add(ConnectionId(5), sender).await;
        assert!(registry.remove(ConnectionId(5)).await);
        assert!(!registry.remove(ConnectionId(5)).await);
        assert!(registry.is_empty().await);
        assert_eq!(registry.broadcast(&Response::Draw).await, DeliveryReport::default());
    }

    #[tokio::test]
    async fn removed_member_gets_no_further_broadcasts() {
        let registry = ConnectionRegistry::new();
        let (sender, mut receiver) = mpsc::channel(4);
        registry.add(ConnectionId(1), sender).await;
        registry.remove(ConnectionId(1)).await;
        registry.broadcast(&Response::Draw).await;
        // The registry held the only sender, so the channel is closed and empty.
        assert_eq!(receiver.recv().await, None);
    }
}
