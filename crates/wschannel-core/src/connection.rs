//! Connection handles and the shared peer set.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ChannelError, ChannelResult};
use crate::registry::{ConnectionId, ConnectionRegistry, RegistryStats};

// =============================================================================
// Peer Handle
// =============================================================================

/// Handle to one live WebSocket connection.
///
/// The handle does not own the socket. It feeds the connection task through an
/// unbounded text queue and can ask that task to release the connection.
/// Sending never blocks, so it is safe to call from message handlers.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    outgoing: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
}

impl PeerHandle {
    /// Creates a new handle.
    pub fn new(
        id: ConnectionId,
        outgoing: mpsc::UnboundedSender<String>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            outgoing,
            shutdown,
        }
    }

    /// Returns the connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `text` as a single text frame.
    pub fn send(&self, text: impl Into<String>) -> ChannelResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(ChannelError::SendFailed(format!(
                "connection {} is closing",
                self.id
            )));
        }
        self.outgoing
            .send(text.into())
            .map_err(|_| ChannelError::SendFailed(format!("connection {} is closed", self.id)))
    }

    /// Requests the connection to close with a going-away frame.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Returns true once the connection has been asked to close or has gone.
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.outgoing.is_closed()
    }

    /// Returns the token the connection task watches for release requests.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}

// =============================================================================
// Peer Set
// =============================================================================

/// A server's connection registry, shared between the channel and its
/// connection tasks.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    inner: Arc<Mutex<ConnectionRegistry<PeerHandle>>>,
}

impl PeerSet {
    /// Creates an empty peer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the underlying registry.
    ///
    /// Never hold the guard across an `.await`.
    pub fn lock(&self) -> MutexGuard<'_, ConnectionRegistry<PeerHandle>> {
        self.inner.lock()
    }

    /// Queues `text` on every registered peer.
    ///
    /// Returns the number of peers that accepted the message.
    pub fn broadcast(&self, text: impl Into<String>) -> usize {
        let text = text.into();
        let registry = self.inner.lock();
        registry
            .iter()
            .filter(|(_, peer)| peer.send(text.clone()).is_ok())
            .count()
    }

    /// Returns the number of registered peers.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if no peer is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Returns registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.inner.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: u64) -> (PeerHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = PeerHandle::new(ConnectionId::from_raw(id), tx, CancellationToken::new());
        (handle, rx)
    }

    #[test]
    fn test_send_queues_text() {
        let (handle, mut rx) = peer(1);
        handle.send("hello").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_send_after_close_fails() {
        let (handle, _rx) = peer(1);
        handle.close();
        assert!(handle.is_closed());
        assert!(matches!(
            handle.send("late"),
            Err(ChannelError::SendFailed(_))
        ));
    }

    #[test]
    fn test_send_to_dropped_task_fails() {
        let (handle, rx) = peer(1);
        drop(rx);
        assert!(handle.is_closed());
        assert!(handle.send("nobody").is_err());
    }

    fn register(peers: &PeerSet) -> (PeerHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = peers.lock();
        let id = registry.reserve_id();
        let handle = PeerHandle::new(id, tx, CancellationToken::new());
        registry.insert(id, handle.clone()).unwrap();
        (handle, rx)
    }

    #[test]
    fn test_broadcast_reaches_every_live_peer() {
        let peers = PeerSet::new();
        let (a, mut rx_a) = register(&peers);
        let (b, mut rx_b) = register(&peers);
        let (c, rx_c) = register(&peers);
        drop(rx_c);

        {
            let registry = peers.lock();
            for handle in [&a, &b, &c] {
                assert_eq!(registry.get(handle.id()).map(PeerHandle::id), Some(handle.id()));
            }
        }

        assert_eq!(peers.broadcast("ping"), 2);
        assert_eq!(rx_a.try_recv().unwrap(), "ping");
        assert_eq!(rx_b.try_recv().unwrap(), "ping");
        assert_eq!(peers.len(), 3);
    }
}
