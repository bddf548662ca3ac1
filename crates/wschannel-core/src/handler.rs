//! Message handler traits.
//!
//! These are the extension points of both channel types. Every method has a
//! no-op default, so an implementation only overrides what it needs.
//!
//! Handlers run on the task that owns the connection. Each call is awaited
//! before the next frame is read, so messages from one connection are seen in
//! arrival order. Binary frames never reach a handler.

use async_trait::async_trait;

use crate::connection::{PeerHandle, PeerSet};
use crate::error::ChannelResult;
use crate::registry::ConnectionId;

// =============================================================================
// Contexts
// =============================================================================

/// What a client handler can do with the connection a message arrived on.
#[derive(Debug, Clone)]
pub struct ClientContext {
    connection: PeerHandle,
    address: String,
}

impl ClientContext {
    /// Creates a new client context.
    pub fn new(connection: PeerHandle, address: impl Into<String>) -> Self {
        Self {
            connection,
            address: address.into(),
        }
    }

    /// Sends a text frame back to the server.
    pub fn send(&self, text: impl Into<String>) -> ChannelResult<()> {
        self.connection.send(text)
    }

    /// Closes this connection.
    pub fn close(&self) {
        self.connection.close();
    }

    /// Returns the address this connection was opened with.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the connection identifier.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id()
    }
}

/// What a server handler can do from inside a connection.
#[derive(Debug, Clone)]
pub struct ServerContext {
    peer: PeerHandle,
    peers: PeerSet,
}

impl ServerContext {
    /// Creates a new server context.
    pub fn new(peer: PeerHandle, peers: PeerSet) -> Self {
        Self { peer, peers }
    }

    /// Sends a text frame to the peer this context belongs to.
    pub fn reply(&self, text: impl Into<String>) -> ChannelResult<()> {
        self.peer.send(text)
    }

    /// Broadcasts a text frame to every connected peer, this one included.
    ///
    /// Returns the number of peers that accepted the message.
    pub fn send_all(&self, text: impl Into<String>) -> usize {
        self.peers.broadcast(text)
    }

    /// Closes this peer's connection.
    pub fn close(&self) {
        self.peer.close();
    }

    /// Returns the identifier of this peer.
    pub fn connection_id(&self) -> ConnectionId {
        self.peer.id()
    }

    /// Returns the number of currently connected peers.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }
}

// =============================================================================
// Handler Traits
// =============================================================================

/// Extension point of a client channel.
#[async_trait]
pub trait ClientHandler: Send + Sync + 'static {
    /// Called once per inbound text frame.
    async fn on_message(&self, ctx: &ClientContext, text: &str) {
        let _ = (ctx, text);
    }
}

/// Extension point of a server channel.
#[async_trait]
pub trait ServerHandler: Send + Sync + 'static {
    /// Called once per inbound text frame from any peer.
    async fn on_message(&self, ctx: &ServerContext, text: &str) {
        let _ = (ctx, text);
    }

    /// Called after a peer has been admitted to the registry.
    async fn on_connect(&self, ctx: &ServerContext) {
        let _ = ctx;
    }

    /// Called after a peer has been retired from the registry.
    ///
    /// Not called for peers released by server teardown.
    async fn on_disconnect(&self, id: ConnectionId) {
        let _ = id;
    }
}

/// Handler that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandler;

impl ClientHandler for NoopHandler {}

impl ServerHandler for NoopHandler {}

#[async_trait]
impl<F> ClientHandler for F
where
    F: Fn(&ClientContext, &str) + Send + Sync + 'static,
{
    async fn on_message(&self, ctx: &ClientContext, text: &str) {
        self(ctx, text);
    }
}

#[async_trait]
impl<F> ServerHandler for F
where
    F: Fn(&ServerContext, &str) + Send + Sync + 'static,
{
    async fn on_message(&self, ctx: &ServerContext, text: &str) {
        self(ctx, text);
    }
}
