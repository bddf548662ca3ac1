mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tracing::Level;

use wschannel_core::{ChannelError, ChannelMode, ChannelState, NoopHandler};
use wschannel_transport::{ClientChannel, ServerChannel};

use common::{EchoRecorder, Inbox, LogCapture, wait_for, write_identity};

async fn echo_server() -> (ServerChannel, Arc<common::ServerRecord>, String) {
    let (handler, record) = EchoRecorder::new();
    let mut server = ServerChannel::new(handler);
    let addr = server.listen_on("127.0.0.1:0", "/test").await.unwrap();
    (server, record, format!("ws://{addr}/test"))
}

#[tokio::test]
async fn test_plain_echo() {
    let (server, record, url) = echo_server().await;

    let inbox = Inbox::default();
    let client = ClientChannel::new(inbox.clone());
    let ctx = client.open(&url).await.unwrap();

    assert_eq!(client.state(), ChannelState::Connected);
    assert_eq!(ctx.address(), url);
    ctx.send("hello!").unwrap();

    wait_for(|| inbox.len() == 1).await;
    assert_eq!(inbox.messages(), vec!["hello!"]);
    assert_eq!(record.messages(), vec!["hello!"]);
    assert_eq!(record.connects(), 1);
    assert_eq!(server.connection_count(), 1);
}

#[tokio::test]
async fn test_send_from_connect_callback() {
    let (_server, _record, url) = echo_server().await;

    let inbox = Inbox::default();
    let client = ClientChannel::new(inbox.clone());
    client.connect(&url, |result| {
        if let Ok(ctx) = result {
            ctx.send("hello!").unwrap();
        }
    });

    wait_for(|| inbox.len() == 1).await;
    assert_eq!(inbox.messages(), vec!["hello!"]);
    assert!(client.is_connected());
    client.send("again").unwrap();
    wait_for(|| inbox.len() == 2).await;
}

#[tokio::test]
async fn test_failed_identity_falls_back_to_plain() {
    let dir = TempDir::new().unwrap();
    let garbage = dir.path().join("garbage.pem");
    std::fs::write(&garbage, "not a certificate").unwrap();

    let (handler, _record) = EchoRecorder::new();
    let mut server = ServerChannel::secure(&garbage, &garbage, handler);
    assert!(!server.is_secure());
    let addr = server.listen_on("127.0.0.1:0", "test").await.unwrap();

    let inbox = Inbox::default();
    let client = ClientChannel::new(inbox.clone());
    let ctx = client.open(format!("ws://{addr}/test")).await.unwrap();
    ctx.send("hello!").unwrap();

    wait_for(|| inbox.len() == 1).await;
}

#[tokio::test]
async fn test_broadcast_and_disconnect() {
    let (server, record, url) = echo_server().await;

    let inbox_a = Inbox::default();
    let inbox_b = Inbox::default();
    let client_a = ClientChannel::new(inbox_a.clone());
    let client_b = ClientChannel::new(inbox_b.clone());
    client_a.open(&url).await.unwrap();
    client_b.open(&url).await.unwrap();
    wait_for(|| server.connection_count() == 2).await;

    client_a.send("first").unwrap();
    wait_for(|| inbox_a.len() == 1 && inbox_b.len() == 1).await;
    assert_eq!(inbox_b.messages(), vec!["first"]);

    assert_eq!(server.send_all("ping"), 2);
    wait_for(|| inbox_a.len() == 2 && inbox_b.len() == 2).await;
    assert_eq!(inbox_a.messages(), vec!["first", "ping"]);

    client_a.close();
    wait_for(|| record.disconnects() == 1).await;
    assert_eq!(server.connection_count(), 1);

    assert_eq!(server.send_all("ping2"), 1);
    wait_for(|| inbox_b.len() == 3).await;

    client_b.send("second").unwrap();
    wait_for(|| inbox_b.len() == 4).await;
    assert_eq!(inbox_b.messages(), vec!["first", "ping", "ping2", "second"]);
    assert_eq!(inbox_a.messages(), vec!["first", "ping"]);

    let stats = server.stats();
    assert_eq!(stats.live, 1);
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.retired, 1);
}

#[tokio::test]
async fn test_server_send_all() {
    let (server, _record, url) = echo_server().await;

    let inbox = Inbox::default();
    let client = ClientChannel::new(inbox.clone());
    client.open(&url).await.unwrap();
    wait_for(|| server.connection_count() == 1).await;

    assert_eq!(server.send_all("from server"), 1);
    wait_for(|| inbox.len() == 1).await;
    assert_eq!(inbox.messages(), vec!["from server"]);
}

#[tokio::test]
async fn test_reconnect_replaces_connection() {
    let (server, record, url) = echo_server().await;

    let successes = Arc::new(Mutex::new(0usize));
    let counter = successes.clone();
    let client = ClientChannel::default();
    client.connect(&url, move |result| {
        if result.is_ok() {
            *counter.lock() += 1;
        }
    });
    wait_for(|| *successes.lock() == 1).await;

    client.reconnect().unwrap();
    wait_for(|| *successes.lock() == 2).await;
    wait_for(|| record.disconnects() == 1).await;

    assert_eq!(record.connects(), 2);
    assert_eq!(server.connection_count(), 1);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_server_ignores_binary_frames() {
    let (capture, _guard) = LogCapture::install();
    let (_server, record, url) = echo_server().await;

    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    ws.send(Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .unwrap();
    ws.send(Message::text("after binary")).await.unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply, Message::text("after binary"));
    assert_eq!(record.messages(), vec!["after binary"]);
    assert!(capture.contains(Level::WARN, "Binary message received, ignored"));
}

#[tokio::test]
async fn test_client_ignores_binary_frames() {
    let (capture, _guard) = LogCapture::install();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(Message::Binary(vec![0xff; 4].into())).await.unwrap();
        ws.send(Message::text("after binary")).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let inbox = Inbox::default();
    let client = ClientChannel::new(inbox.clone());
    client.open(format!("ws://{addr}/")).await.unwrap();

    wait_for(|| inbox.len() == 1).await;
    assert_eq!(inbox.messages(), vec!["after binary"]);
    assert!(client.is_connected());
    assert!(capture.contains(Level::WARN, "Binary message received, ignored"));
}

#[tokio::test]
async fn test_connect_failure_fires_callback_once() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let client = ClientChannel::default();
    client.connect(format!("ws://127.0.0.1:{port}/test"), move |result| {
        sink.lock().push(result.map(|_| ()));
    });

    wait_for(|| !results.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let results = results.lock();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(ChannelError::ConnectFailed { .. })));
    assert_eq!(client.state(), ChannelState::Idle);
}

#[tokio::test]
async fn test_connect_while_connecting_then_close() {
    // Accepts TCP but never answers the upgrade request.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let first = Arc::new(Mutex::new(Vec::new()));
    let second = Arc::new(Mutex::new(Vec::new()));
    let client = ClientChannel::default();
    let url = format!("ws://{addr}/test");

    let sink = first.clone();
    client.connect(&url, move |result| sink.lock().push(result.map(|_| ())));
    assert_eq!(client.state(), ChannelState::Connecting);

    let sink = second.clone();
    client.connect(&url, move |result| sink.lock().push(result.map(|_| ())));
    wait_for(|| second.lock().len() == 1).await;
    assert!(matches!(
        second.lock()[0],
        Err(ChannelError::ConnectInProgress)
    ));
    assert!(matches!(
        client.reconnect(),
        Err(ChannelError::ConnectInProgress)
    ));

    client.close();
    wait_for(|| first.lock().len() == 1).await;
    assert!(matches!(first.lock()[0], Err(ChannelError::Cancelled)));
    assert_eq!(client.state(), ChannelState::Closed);
}

#[tokio::test]
async fn test_server_shutdown_releases_clients() {
    let (mut server, record, url) = echo_server().await;

    let client = ClientChannel::new(NoopHandler);
    client.open(&url).await.unwrap();
    wait_for(|| server.connection_count() == 1).await;

    server.shutdown();
    server.shutdown();

    assert_eq!(server.connection_count(), 0);
    assert!(!server.is_listening());
    wait_for(|| client.state() == ChannelState::Idle).await;
    assert_eq!(record.disconnects(), 0);
    assert!(matches!(
        server.listen_on("127.0.0.1:0", "/test").await,
        Err(ChannelError::Closed)
    ));
}

#[tokio::test]
async fn test_client_close_is_idempotent() {
    let (server, record, url) = echo_server().await;

    let client = ClientChannel::default();
    client.open(&url).await.unwrap();
    wait_for(|| server.connection_count() == 1).await;

    client.close();
    client.close();
    drop(client);

    wait_for(|| record.disconnects() == 1).await;
    assert_eq!(server.connection_count(), 0);
}

#[tokio::test]
async fn test_unknown_path_is_rejected() {
    let (_server, record, url) = echo_server().await;

    let client = ClientChannel::default();
    let other = url.replace("/test", "/other");
    assert!(matches!(
        client.open(other).await,
        Err(ChannelError::ConnectFailed { .. })
    ));
    assert_eq!(record.connects(), 0);
}

#[tokio::test]
async fn test_secure_client_rejects_plain_scheme() {
    let dir = TempDir::new().unwrap();
    let (cert, _key) = write_identity(&dir);

    let client = ClientChannel::secure(&cert, NoopHandler).unwrap();
    assert_eq!(client.mode(), ChannelMode::Secure);
    assert!(matches!(
        client.open("ws://localhost:41001/test").await,
        Err(ChannelError::UnsupportedScheme { mode: ChannelMode::Secure, .. })
    ));
}
