//! Shared helpers for the channel integration tests.

#![allow(dead_code)]

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rcgen::{CertifiedKey, generate_simple_self_signed};
use tempfile::TempDir;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Registry;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use wschannel_core::{
    ClientContext, ClientHandler, ConnectionId, ServerContext, ServerHandler, async_trait,
};

/// Polls `condition` until it holds, panicking after five seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

/// Writes a self-signed `localhost` certificate and key into `dir`.
pub fn write_identity(dir: &TempDir) -> (PathBuf, PathBuf) {
    let CertifiedKey { cert, key_pair } =
        generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = dir.path().join("localhost.crt");
    let key_path = dir.path().join("localhost.key");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
    (cert_path, key_path)
}

// =============================================================================
// Recording handlers
// =============================================================================

#[derive(Default)]
pub struct ServerRecord {
    pub connects: AtomicUsize,
    pub messages: Mutex<Vec<String>>,
    pub disconnects: Mutex<Vec<ConnectionId>>,
}

impl ServerRecord {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.lock().len()
    }
}

/// Server handler that records every callback and echoes text to all peers.
pub struct EchoRecorder(pub Arc<ServerRecord>);

impl EchoRecorder {
    pub fn new() -> (Self, Arc<ServerRecord>) {
        let record = Arc::new(ServerRecord::default());
        (Self(record.clone()), record)
    }
}

#[async_trait]
impl ServerHandler for EchoRecorder {
    async fn on_message(&self, ctx: &ServerContext, text: &str) {
        self.0.messages.lock().push(text.to_string());
        ctx.send_all(text);
    }

    async fn on_connect(&self, _ctx: &ServerContext) {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_disconnect(&self, id: ConnectionId) {
        self.0.disconnects.lock().push(id);
    }
}

/// Client handler that records every inbound text frame.
#[derive(Clone, Default)]
pub struct Inbox(pub Arc<Mutex<Vec<String>>>);

impl Inbox {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

#[async_trait]
impl ClientHandler for Inbox {
    async fn on_message(&self, _ctx: &ClientContext, text: &str) {
        self.0.lock().push(text.to_string());
    }
}

// =============================================================================
// Log capture
// =============================================================================

/// Layer that keeps every event's level and message.
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl LogCapture {
    /// Installs the capture as the default subscriber for the current thread.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = Registry::default().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.events
            .lock()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.events
            .lock()
            .push((*event.metadata().level(), visitor.message));
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        }
    }
}
