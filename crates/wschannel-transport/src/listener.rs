//! TCP listener with optional TLS termination, served through axum.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tokio_util::either::Either;
use tracing::{debug, error, warn};

/// Upper bound on a single TLS handshake.
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Completed handshakes waiting for axum to pick them up.
const HANDSHAKE_QUEUE: usize = 64;

type Handshaken = (TlsStream<TcpStream>, SocketAddr);

/// Listener handed to [`axum::serve`].
///
/// Plain listeners yield the TCP stream directly. Secure listeners run every
/// TLS handshake on its own task, so a peer that stalls mid-handshake never
/// delays the others; peers that fail it are logged and skipped.
pub(crate) enum ChannelListener {
    Plain(TcpListener),
    Secure {
        local_addr: SocketAddr,
        handshakes: mpsc::Receiver<Handshaken>,
    },
}

impl ChannelListener {
    /// Must be called from within a tokio runtime when `tls` is set.
    pub(crate) fn new(tcp: TcpListener, local_addr: SocketAddr, tls: Option<TlsAcceptor>) -> Self {
        match tls {
            None => Self::Plain(tcp),
            Some(acceptor) => {
                let (tx, handshakes) = mpsc::channel(HANDSHAKE_QUEUE);
                tokio::spawn(accept_tls(tcp, acceptor, tx));
                Self::Secure {
                    local_addr,
                    handshakes,
                }
            }
        }
    }
}

impl axum::serve::Listener for ChannelListener {
    type Io = Either<TcpStream, TlsStream<TcpStream>>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self {
            Self::Plain(tcp) => {
                let (stream, addr) = accept_tcp(tcp).await;
                (Either::Left(stream), addr)
            }
            Self::Secure { handshakes, .. } => match handshakes.recv().await {
                Some((stream, addr)) => (Either::Right(stream), addr),
                // the accept task only exits once this receiver is gone
                None => std::future::pending().await,
            },
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        match self {
            Self::Plain(tcp) => tcp.local_addr(),
            Self::Secure { local_addr, .. } => Ok(*local_addr),
        }
    }
}

/// Accepts TCP peers until the listener is dropped, handing each one to a
/// handshake task.
async fn accept_tls(tcp: TcpListener, acceptor: TlsAcceptor, tx: mpsc::Sender<Handshaken>) {
    loop {
        let (stream, addr) = tokio::select! {
            () = tx.closed() => break,
            accepted = accept_tcp(&tcp) => accepted,
        };
        tokio::spawn(handshake(acceptor.clone(), stream, addr, tx.clone()));
    }
    debug!("TLS accept loop stopped");
}

async fn handshake(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    addr: SocketAddr,
    tx: mpsc::Sender<Handshaken>,
) {
    match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) => {
            debug!(remote_addr = %addr, "TLS handshake completed");
            // a closed queue means the server stopped; the stream is dropped
            let _ = tx.send((tls_stream, addr)).await;
        }
        Ok(Err(e)) => warn!(remote_addr = %addr, error = %e, "TLS handshake failed"),
        Err(_) => warn!(remote_addr = %addr, "TLS handshake timed out"),
    }
}

async fn accept_tcp(tcp: &TcpListener) -> (TcpStream, SocketAddr) {
    loop {
        match tcp.accept().await {
            Ok(accepted) => return accepted,
            Err(e) => handle_accept_error(e).await,
        }
    }
}

/// Per-connection errors are skipped; anything else (such as running out of
/// file descriptors) backs off for a second before accepting again.
async fn handle_accept_error(e: io::Error) {
    if is_connection_error(&e) {
        return;
    }
    error!(error = %e, "Accept error");
    tokio::time::sleep(Duration::from_secs(1)).await;
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}
