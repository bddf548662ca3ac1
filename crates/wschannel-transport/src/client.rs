//! WebSocket client channel.
//!
//! A [`ClientChannel`] owns one outbound connection. `connect` only starts the
//! handshake; its outcome arrives later through the callback, which runs
//! exactly once per attempt. Inbound text frames go to the channel's
//! [`ClientHandler`].

use std::path::Path;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use wschannel_core::{
    ChannelError, ChannelMode, ChannelResult, ChannelState, ClientContext, ClientHandler,
    ConnectionId, NoopHandler, PeerHandle,
};

use crate::tls;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of one connect attempt. On success the context addresses the new
/// connection.
pub type ConnectResult = ChannelResult<ClientContext>;

type ConnectedHandler = Arc<dyn Fn(ConnectResult) + Send + Sync>;

/// Connection context: the channel mode and, in secure mode, the TLS
/// configuration every attempt is made with.
struct Session {
    mode: ChannelMode,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl Session {
    fn check_address(&self, address: &str) -> ChannelResult<()> {
        let Some((scheme, rest)) = address.split_once("://") else {
            return Err(ChannelError::InvalidAddress {
                address: address.to_string(),
                reason: "missing URL scheme".to_string(),
            });
        };
        if rest.is_empty() {
            return Err(ChannelError::InvalidAddress {
                address: address.to_string(),
                reason: "missing host".to_string(),
            });
        }
        if !self.mode.accepts_scheme(scheme) {
            return Err(ChannelError::UnsupportedScheme {
                scheme: scheme.to_ascii_lowercase(),
                mode: self.mode,
            });
        }
        Ok(())
    }

    async fn open(&self, address: &str) -> ChannelResult<WsStream> {
        let connector = match &self.tls {
            Some(config) => Connector::Rustls(Arc::clone(config)),
            None => Connector::Plain,
        };
        let (stream, _response) =
            connect_async_tls_with_config(address, None, false, Some(connector))
                .await
                .map_err(|e| ChannelError::ConnectFailed {
                    url: address.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(stream)
    }
}

/// Mutable channel state. Only touched under the lock, never across an await.
struct ClientInner {
    state: ChannelState,
    address: Option<String>,
    connected_handler: Option<ConnectedHandler>,
    attempt: Option<CancellationToken>,
    connection: Option<PeerHandle>,
    next_id: u64,
}

impl ClientInner {
    fn next_connection_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId::from_raw(self.next_id)
    }

    /// Releases the active connection without going through the peer-close
    /// path.
    fn release_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(connection = %connection.id(), "Releasing active connection");
            connection.close();
        }
    }
}

struct ClientShared {
    session: Session,
    handler: Arc<dyn ClientHandler>,
    inner: Mutex<ClientInner>,
}

impl ClientShared {
    /// Starts a connect attempt. The caller holds the lock and has already
    /// checked that no other attempt is outstanding.
    fn begin_attempt(
        self: &Arc<Self>,
        inner: &mut ClientInner,
        address: String,
        on_connected: ConnectedHandler,
    ) {
        let attempt = CancellationToken::new();
        inner.attempt = Some(attempt.clone());
        inner.state = ChannelState::Connecting;

        info!(address = %address, mode = %self.session.mode, "Connecting to WebSocket server");

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                () = attempt.cancelled() => Err(ChannelError::Cancelled),
                result = shared.session.open(&address) => result,
            };
            let result = shared.finish_attempt(&attempt, &address, outcome);
            on_connected(result);
        });
    }

    fn finish_attempt(
        self: &Arc<Self>,
        attempt: &CancellationToken,
        address: &str,
        outcome: ChannelResult<WsStream>,
    ) -> ConnectResult {
        let mut inner = self.inner.lock();

        // `close` cancels the token under this same lock, so a cancelled token
        // means the channel no longer expects this attempt.
        if attempt.is_cancelled() {
            debug!(address = %address, "Connect attempt cancelled");
            return Err(ChannelError::Cancelled);
        }
        inner.attempt = None;

        match outcome {
            Ok(stream) => {
                let id = inner.next_connection_id();
                let (tx, rx) = mpsc::unbounded_channel();
                let connection = PeerHandle::new(id, tx, CancellationToken::new());
                inner.connection = Some(connection.clone());
                inner.state = ChannelState::Connected;

                info!(connection = %id, address = %address, "WebSocket client connected");

                let release = connection.shutdown_token().clone();
                let ctx = ClientContext::new(connection, address);
                tokio::spawn(drive_connection(
                    Arc::clone(self),
                    stream,
                    rx,
                    ctx.clone(),
                    release,
                ));
                Ok(ctx)
            }
            Err(e) => {
                inner.state = ChannelState::Idle;
                warn!(address = %address, error = %e, "Unable to connect");
                Err(e)
            }
        }
    }

    /// Called by the connection task when it exits, whatever the reason.
    fn connection_finished(&self, id: ConnectionId) {
        let mut inner = self.inner.lock();
        if inner.connection.as_ref().is_some_and(|c| c.id() == id) {
            inner.connection = None;
            inner.state = ChannelState::Idle;
            info!(connection = %id, "Connection closed");
        }
    }
}

/// Runs one established connection until the peer closes it or the channel
/// releases it.
async fn drive_connection(
    shared: Arc<ClientShared>,
    stream: WsStream,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    ctx: ClientContext,
    release: CancellationToken,
) {
    let id = ctx.connection_id();
    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            biased;

            () = release.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Away,
                    reason: "closing client channel".into(),
                };
                if let Err(e) = ws_tx.send(Message::Close(Some(frame))).await {
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
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                    trace!(connection = %id, "Received control frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(connection = %id, frame = ?frame, "Server closed connection");
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
    shared.connection_finished(id);
}

fn deliver_later(on_connected: ConnectedHandler, result: ConnectResult) {
    tokio::spawn(async move { on_connected(result) });
}

/// WebSocket client channel, plain (`ws://`) or secure (`wss://`).
///
/// # Example
///
/// ```rust,ignore
/// use wschannel_transport::ClientChannel;
/// use wschannel_core::NoopHandler;
///
/// let channel = ClientChannel::new(NoopHandler);
/// channel.connect("ws://localhost:41001/test", |result| match result {
///     Ok(ctx) => {
///         let _ = ctx.send("hello!");
///     }
///     Err(e) => eprintln!("connect failed: {e}"),
/// });
/// ```
///
/// All methods that start I/O must be called from within a tokio runtime.
pub struct ClientChannel {
    shared: Arc<ClientShared>,
}

impl ClientChannel {
    /// Creates a plain channel.
    pub fn new(handler: impl ClientHandler) -> Self {
        Self::with_session(
            Session {
                mode: ChannelMode::Plain,
                tls: None,
            },
            Arc::new(handler),
        )
    }

    /// Creates a secure channel that trusts only the certificates in
    /// `ca_file`.
    pub fn secure(ca_file: impl AsRef<Path>, handler: impl ClientHandler) -> ChannelResult<Self> {
        let ca_file = ca_file.as_ref();
        if !ca_file.exists() {
            return Err(ChannelError::CertificateNotFound(ca_file.to_path_buf()));
        }
        let config = tls::client_config(ca_file)?;
        info!(ca_file = %ca_file.display(), "Created secure client session");

        Ok(Self::with_session(
            Session {
                mode: ChannelMode::Secure,
                tls: Some(config),
            },
            Arc::new(handler),
        ))
    }

    fn with_session(session: Session, handler: Arc<dyn ClientHandler>) -> Self {
        Self {
            shared: Arc::new(ClientShared {
                session,
                handler,
                inner: Mutex::new(ClientInner {
                    state: ChannelState::Idle,
                    address: None,
                    connected_handler: None,
                    attempt: None,
                    connection: None,
                    next_id: 0,
                }),
            }),
        }
    }

    /// Starts connecting to `address` and returns immediately.
    ///
    /// `on_connected` runs exactly once for this attempt, on the runtime. It
    /// is kept and runs again for every later [`reconnect`](Self::reconnect).
    /// If the channel is already connected, the current connection is released
    /// first. A call made while another attempt is outstanding is rejected
    /// with [`ChannelError::ConnectInProgress`].
    pub fn connect<F>(&self, address: impl Into<String>, on_connected: F)
    where
        F: Fn(ConnectResult) + Send + Sync + 'static,
    {
        let address = address.into();
        let on_connected: ConnectedHandler = Arc::new(on_connected);
        let mut inner = self.shared.inner.lock();

        let rejection = match inner.state {
            ChannelState::Closed => Some(ChannelError::Closed),
            ChannelState::Connecting => Some(ChannelError::ConnectInProgress),
            ChannelState::Idle | ChannelState::Connected => {
                self.shared.session.check_address(&address).err()
            }
        };
        if let Some(e) = rejection {
            drop(inner);
            warn!(address = %address, error = %e, "Connect rejected");
            deliver_later(on_connected, Err(e));
            return;
        }

        inner.address = Some(address.clone());
        inner.connected_handler = Some(Arc::clone(&on_connected));
        inner.release_connection();
        self.shared.begin_attempt(&mut inner, address, on_connected);
    }

    /// Connects to `address` and waits for the outcome.
    ///
    /// The callback installed here only reports this first attempt; later
    /// reconnects run silently.
    pub async fn open(&self, address: impl Into<String>) -> ConnectResult {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        self.connect(address, move |result| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(result);
            }
        });
        rx.await.unwrap_or(Err(ChannelError::Cancelled))
    }

    /// Re-runs the connect sequence with the stored address and callback.
    ///
    /// A held connection is released first without a "closed" notification.
    pub fn reconnect(&self) -> ChannelResult<()> {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            ChannelState::Closed => return Err(ChannelError::Closed),
            ChannelState::Connecting => return Err(ChannelError::ConnectInProgress),
            ChannelState::Idle | ChannelState::Connected => {}
        }
        let (Some(address), Some(on_connected)) =
            (inner.address.clone(), inner.connected_handler.clone())
        else {
            return Err(ChannelError::NoAddress);
        };

        inner.release_connection();
        self.shared.begin_attempt(&mut inner, address, on_connected);
        Ok(())
    }

    /// Queues `text` as one text frame on the active connection.
    pub fn send(&self, text: impl Into<String>) -> ChannelResult<()> {
        let inner = self.shared.inner.lock();
        inner
            .connection
            .as_ref()
            .ok_or(ChannelError::NotConnected)?
            .send(text)
    }

    /// Releases the connection and the session. Safe to call repeatedly.
    ///
    /// An outstanding connect attempt is cancelled and its callback receives
    /// [`ChannelError::Cancelled`].
    pub fn close(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == ChannelState::Closed {
            return;
        }
        if let Some(attempt) = inner.attempt.take() {
            attempt.cancel();
        }
        inner.release_connection();
        inner.state = ChannelState::Closed;
        info!(mode = %self.shared.session.mode, "Client channel closed");
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.shared.inner.lock().state
    }

    /// Returns true if a connection is established.
    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Returns the last address passed to `connect`.
    pub fn address(&self) -> Option<String> {
        self.shared.inner.lock().address.clone()
    }

    /// Returns whether this channel is plain or secure.
    pub fn mode(&self) -> ChannelMode {
        self.shared.session.mode
    }
}

impl Default for ClientChannel {
    fn default() -> Self {
        Self::new(NoopHandler)
    }
}

impl Drop for ClientChannel {
    fn drop(&mut self) {
        self.close();
    }
}
