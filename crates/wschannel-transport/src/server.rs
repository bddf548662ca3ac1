//! WebSocket server channel.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use wschannel_core::{
    ChannelError, ChannelMode, ChannelResult, NoopHandler, PeerHandle, PeerSet, RegistryStats,
    ServerContext, ServerHandler,
};

use crate::listener::ChannelListener;
use crate::tls;

/// Shared state for the accept loop and every connection task.
struct ServerShared {
    handler: Box<dyn ServerHandler>,
    peers: PeerSet,
    /// Parent of every peer's token. Cancelled once, by teardown.
    shutdown: CancellationToken,
}

struct Listening {
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

/// WebSocket server channel, plain (`ws://`) or secure (`wss://`).
///
/// Accepted connections are kept in a registry until the peer closes them or
/// the channel shuts down. Every inbound text frame is handed to the
/// channel's [`ServerHandler`].
///
/// # Example
///
/// ```rust,ignore
/// use wschannel_core::ServerContext;
/// use wschannel_transport::ServerChannel;
///
/// let mut server = ServerChannel::new(|ctx: &ServerContext, text: &str| {
///     ctx.send_all(text);
/// });
/// server.listen(41001, "/test").await?;
/// ```
pub struct ServerChannel {
    /// Held until the first successful bind hands it to the listener.
    identity: Option<Arc<rustls::ServerConfig>>,
    mode: ChannelMode,
    shared: Arc<ServerShared>,
    listening: Option<Listening>,
}

impl ServerChannel {
    /// Creates a plain server channel.
    pub fn new(handler: impl ServerHandler) -> Self {
        Self::with_identity(None, Box::new(handler))
    }

    /// Creates a secure server channel.
    ///
    /// If the certificate or key cannot be loaded the failure is logged and
    /// the channel serves plain `ws://` instead. Check
    /// [`is_secure`](Self::is_secure), or use [`try_secure`](Self::try_secure)
    /// to get the error.
    pub fn secure(
        cert_file: impl AsRef<Path>,
        key_file: impl AsRef<Path>,
        handler: impl ServerHandler,
    ) -> Self {
        let identity = match load_identity(cert_file.as_ref(), key_file.as_ref()) {
            Ok(identity) => Some(identity),
            Err(e) => {
                error!(error = %e, "Failed to load server identity, serving plain WebSocket");
                None
            }
        };
        Self::with_identity(identity, Box::new(handler))
    }

    /// Creates a secure server channel, failing if the identity cannot be
    /// loaded.
    pub fn try_secure(
        cert_file: impl AsRef<Path>,
        key_file: impl AsRef<Path>,
        handler: impl ServerHandler,
    ) -> ChannelResult<Self> {
        let identity = load_identity(cert_file.as_ref(), key_file.as_ref())?;
        Ok(Self::with_identity(Some(identity), Box::new(handler)))
    }

    fn with_identity(
        identity: Option<Arc<rustls::ServerConfig>>,
        handler: Box<dyn ServerHandler>,
    ) -> Self {
        let mode = if identity.is_some() {
            ChannelMode::Secure
        } else {
            ChannelMode::Plain
        };
        Self {
            identity,
            mode,
            shared: Arc::new(ServerShared {
                handler,
                peers: PeerSet::new(),
                shutdown: CancellationToken::new(),
            }),
            listening: None,
        }
    }

    /// Listens on `port` on all interfaces and serves upgrades at `path`.
    pub async fn listen(&mut self, port: u16, path: &str) -> ChannelResult<SocketAddr> {
        self.listen_on(&format!("0.0.0.0:{port}"), path).await
    }

    /// Listens on `addr` and serves upgrades at `path`.
    ///
    /// Returns the bound address, which differs from `addr` when binding port
    /// 0. A leading `/` is added to `path` if missing. Requests for any other
    /// path are answered with 404. Must be called from within a tokio runtime.
    pub async fn listen_on(&mut self, addr: &str, path: &str) -> ChannelResult<SocketAddr> {
        if self.shared.shutdown.is_cancelled() {
            return Err(ChannelError::Closed);
        }
        if let Some(listening) = &self.listening {
            return Err(ChannelError::AlreadyListening(listening.local_addr));
        }
        let path = normalize_path(path)?;

        let listen_failed = |e: std::io::Error| ChannelError::ListenFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        };
        let tcp = TcpListener::bind(addr).await.map_err(listen_failed)?;
        let local_addr = tcp.local_addr().map_err(listen_failed)?;

        let router = Router::new()
            .route(&path, get(upgrade))
            .with_state(Arc::clone(&self.shared));
        let listener = ChannelListener::new(
            tcp,
            local_addr,
            self.identity.take().map(TlsAcceptor::from),
        );

        info!(addr = %local_addr, path = %path, mode = %self.mode(), "WebSocket server listening");

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::select! {
                result = axum::serve(listener, router) => {
                    if let Err(e) = result {
                        error!(error = %e, "WebSocket server error");
                    }
                }
                () = shared.shutdown.cancelled() => {
                    info!(addr = %local_addr, "WebSocket server stopped accepting");
                }
            }
        });

        self.listening = Some(Listening { local_addr, task });
        Ok(local_addr)
    }

    /// Queues `text` on every connected peer.
    ///
    /// Returns the number of peers that accepted it.
    pub fn send_all(&self, text: impl Into<String>) -> usize {
        self.shared.peers.broadcast(text)
    }

    /// Returns the number of connected peers.
    pub fn connection_count(&self) -> usize {
        self.shared.peers.len()
    }

    /// Returns registry statistics.
    pub fn stats(&self) -> RegistryStats {
        self.shared.peers.stats()
    }

    /// Returns the bound address once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listening.as_ref().map(|l| l.local_addr)
    }

    /// Returns true while the accept loop is running.
    pub fn is_listening(&self) -> bool {
        self.listening
            .as_ref()
            .is_some_and(|l| !l.task.is_finished())
            && !self.shared.shutdown.is_cancelled()
    }

    /// Returns true if a TLS identity was loaded.
    pub fn is_secure(&self) -> bool {
        self.mode == ChannelMode::Secure
    }

    /// Returns whether this channel serves plain or secure connections.
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Stops accepting and releases every registered connection. Safe to call
    /// repeatedly.
    ///
    /// Released peers are sent a going-away close frame. `on_disconnect` is
    /// not called for them.
    pub fn shutdown(&self) {
        let released = {
            let mut registry = self.shared.peers.lock();
            if self.shared.shutdown.is_cancelled() {
                return;
            }
            self.shared.shutdown.cancel();
            registry.drain()
        };
        if self.identity.is_some() {
            debug!("Releasing unused server identity");
        }
        info!(released = released.len(), "Server channel shut down");
    }
}

impl Default for ServerChannel {
    fn default() -> Self {
        Self::new(NoopHandler)
    }
}

impl Drop for ServerChannel {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn load_identity(cert_file: &Path, key_file: &Path) -> ChannelResult<Arc<rustls::ServerConfig>> {
    for file in [cert_file, key_file] {
        if !file.exists() {
            return Err(ChannelError::CertificateNotFound(file.to_path_buf()));
        }
    }
    let config = tls::server_config(cert_file, key_file)?;
    info!(cert_file = %cert_file.display(), "Loaded server identity");
    Ok(config)
}

/// Ensures a leading `/` and rejects router wildcard syntax.
fn normalize_path(path: &str) -> ChannelResult<String> {
    if path.contains(['{', '}', '*']) {
        return Err(ChannelError::InvalidPath(path.to_string()));
    }
    if path.starts_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("/{path}"))
    }
}

async fn upgrade(ws: WebSocketUpgrade, State(shared): State<Arc<ServerShared>>) -> Response {
    ws.on_upgrade(move |socket| serve_peer(socket, shared))
}

const SHUTDOWN_REASON: &str = "server channel shutting down";

fn going_away(reason: &'static str) -> CloseFrame {
    CloseFrame {
        code: close_code::AWAY,
        reason: reason.into(),
    }
}

/// Registers a new peer, unless teardown has already started.
fn admit(shared: &ServerShared, outgoing: mpsc::UnboundedSender<String>) -> Option<PeerHandle> {
    let mut registry = shared.peers.lock();
    if shared.shutdown.is_cancelled() {
        return None;
    }
    let id = registry.reserve_id();
    let peer = PeerHandle::new(id, outgoing, shared.shutdown.child_token());
    if let Err(e) = registry.insert(id, peer.clone()) {
        debug_assert!(false, "fresh connection id rejected: {e}");
        error!(error = %e, "Failed to register connection");
        return None;
    }
    Some(peer)
}

/// Runs one accepted connection from registration to retirement.
async fn serve_peer(mut socket: WebSocket, shared: Arc<ServerShared>) {
    let (tx, mut outgoing) = mpsc::unbounded_channel();

    let Some(peer) = admit(&shared, tx) else {
        debug!("Refusing connection, server is shutting down");
        let _ = socket.send(Message::Close(Some(going_away(SHUTDOWN_REASON)))).await;
        return;
    };

    let id = peer.id();
    let release = peer.shutdown_token().clone();
    let ctx = ServerContext::new(peer, shared.peers.clone());

    info!(connection = %id, live = ctx.connection_count(), "WebSocket connection established");
    shared.handler.on_connect(&ctx).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            biased;

            () = release.cancelled() => {
                let reason = if shared.shutdown.is_cancelled() {
                    SHUTDOWN_REASON
                } else {
                    "connection closed by server"
                };
                if let Err(e) = ws_tx.send(Message::Close(Some(going_away(reason)))).await {
                    trace!(connection = %id, error = %e, "Close frame not delivered");
                }
                break;
            }

            Some(text) = outgoing.recv() => {
                if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                    warn!(connection = %id, error = %e, "Failed to send message");
                }
            }

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    trace!(connection = %id, len = text.len(), "Received text");
                    shared.handler.on_message(&ctx, text.as_str()).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!(connection = %id, len = data.len(), "Binary message received, ignored");
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    trace!(connection = %id, "Received control frame");
                }
                Some(Ok(Message::Close(_))) => {
                    info!(connection = %id, "WebSocket connection closed by client");
                    break;
                }
                Some(Err(e)) => {
                    warn!(connection = %id, error = %e, "WebSocket error");
                    break;
                }
                None => {
                    info!(connection = %id, "WebSocket stream ended");
                    break;
                }
            }
        }
    }

    let _ = ws_tx.close().await;

    // Teardown cancels the token and drains the registry under this lock, so
    // after it the entry is already gone.
    let retired = {
        let mut registry = shared.peers.lock();
        if shared.shutdown.is_cancelled() {
            None
        } else {
            Some(registry.retire(id))
        }
    };

    match retired {
        Some(Ok(_)) => {
            info!(connection = %id, live = shared.peers.len(), "WebSocket connection closed");
            shared.handler.on_disconnect(id).await;
        }
        Some(Err(e)) => {
            debug_assert!(false, "live connection missing from registry: {e}");
            error!(error = %e, "Failed to retire connection");
        }
        None => {
            debug!(connection = %id, "Connection released by server shutdown");
        }
    }
}
