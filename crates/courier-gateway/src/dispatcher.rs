use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use courier_types::events::GatewayEvent;

/// Process-wide registry of active gateway connections, keyed by user id.
///
/// This is the logical broadcast group per user: a message push addressed to
/// a user goes to every connection they currently hold (one per tab/device).
/// A user with no live connections is a silent no-op — delivery is
/// at-most-once and best-effort, with no offline queue.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// user_id -> live connections: (conn_id, sender)
    user_channels: RwLock<HashMap<i64, Vec<(Uuid, mpsc::UnboundedSender<GatewayEvent>)>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a user. Returns the connection id, a sender
    /// for direct replies on this connection, and the receiving end that the
    /// connection loop drains.
    pub async fn register(
        &self,
        user_id: i64,
    ) -> (
        Uuid,
        mpsc::UnboundedSender<GatewayEvent>,
        mpsc::UnboundedReceiver<GatewayEvent>,
    ) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .push((conn_id, tx.clone()));
        (conn_id, tx, rx)
    }

    /// Remove one connection. A conn_id that was already removed (or
    /// belongs to another connection of the same user) is a no-op.
    pub async fn unregister(&self, user_id: i64, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.retain(|(id, _)| *id != conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Push an event to every live connection of a user. Connections whose
    /// receiving task has gone away are dropped silently.
    pub async fn send_to_user(&self, user_id: i64, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some(conns) = channels.get(&user_id) {
            for (_, tx) in conns {
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Number of live connections for a user.
    pub async fn connection_count(&self, user_id: i64) -> usize {
        self.inner
            .user_channels
            .read()
            .await
            .get(&user_id)
            .map_or(0, |conns| conns.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_event() -> GatewayEvent {
        GatewayEvent::Ready {
            user_id: 1,
            name: "probe".into(),
        }
    }

    #[tokio::test]
    async fn test_register_send_unregister() {
        let dispatcher = Dispatcher::new();
        let (conn_id, _tx, mut rx) = dispatcher.register(1).await;
        assert_eq!(dispatcher.connection_count(1).await, 1);

        dispatcher.send_to_user(1, probe_event()).await;
        assert!(matches!(
            rx.recv().await,
            Some(GatewayEvent::Ready { user_id: 1, .. })
        ));

        dispatcher.unregister(1, conn_id).await;
        assert_eq!(dispatcher.connection_count(1).await, 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_user_is_noop() {
        let dispatcher = Dispatcher::new();
        // Must not panic or block
        dispatcher.send_to_user(42, probe_event()).await;
    }

    #[tokio::test]
    async fn test_multiple_connections_per_user_all_receive() {
        let dispatcher = Dispatcher::new();
        let (_c1, _t1, mut rx1) = dispatcher.register(7).await;
        let (_c2, _t2, mut rx2) = dispatcher.register(7).await;
        assert_eq!(dispatcher.connection_count(7).await, 2);

        dispatcher.send_to_user(7, probe_event()).await;
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_unregister_only_removes_matching_connection() {
        let dispatcher = Dispatcher::new();
        let (c1, _t1, _rx1) = dispatcher.register(7).await;
        let (_c2, _t2, mut rx2) = dispatcher.register(7).await;

        dispatcher.unregister(7, c1).await;
        assert_eq!(dispatcher.connection_count(7).await, 1);

        // Stale unregister is a no-op
        dispatcher.unregister(7, c1).await;
        assert_eq!(dispatcher.connection_count(7).await, 1);

        dispatcher.send_to_user(7, probe_event()).await;
        assert!(rx2.recv().await.is_some());
    }
}
