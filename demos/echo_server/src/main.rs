//! Echo Server Example
//!
//! Accepts WebSocket connections and sends every text message it receives to
//! all connected clients, the sender included.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package echo-server
//! cargo run --package echo-server -- --port 9000 --path /chat
//! cargo run --package echo-server -- --cert localhost.crt --key localhost.key
//! ```
//!
//! Settings not given on the command line come from `wschannel.toml` (or the
//! file passed with `--config`) and `WSCHANNEL_*` environment variables.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use wschannel::prelude::*;
use wschannel::runtime::config::{ServerTlsConfig, validate_config};

#[derive(Parser, Debug)]
#[command(name = "echo-server", version, about)]
struct Args {
    /// Configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Path of the WebSocket endpoint.
    #[arg(long)]
    path: Option<String>,

    /// PEM certificate chain; serves wss:// together with --key.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// PEM private key.
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,
}

struct Echo;

#[async_trait]
impl ServerHandler for Echo {
    async fn on_message(&self, ctx: &ServerContext, text: &str) {
        let delivered = ctx.send_all(text);
        info!(from = %ctx.connection_id(), delivered, "{text}");
    }

    async fn on_connect(&self, ctx: &ServerContext) {
        info!(connection = %ctx.connection_id(), live = ctx.connection_count(), "Client connected");
    }

    async fn on_disconnect(&self, id: ConnectionId) {
        info!(connection = %id, "Client disconnected");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigLoader::new().maybe_file(args.config.as_ref()).load()?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(path) = args.path {
        config.server.path = path;
    }
    if let (Some(cert_file), Some(key_file)) = (args.cert, args.key) {
        config.server.tls = Some(ServerTlsConfig {
            cert_file,
            key_file,
        });
    }
    validate_config(&config)?;
    init_from_config(&config.logging);

    let server_config = config.server;
    EventLoop::new()?.run(async move {
        let mut server = match &server_config.tls {
            Some(tls) => ServerChannel::secure(&tls.cert_file, &tls.key_file, Echo),
            None => ServerChannel::new(Echo),
        };
        let addr = server
            .listen_on(&server_config.bind_addr(), &server_config.path)
            .await?;

        info!(
            addr = %addr,
            path = %server_config.path,
            mode = %server.mode(),
            "Echo server ready"
        );
        Ok::<_, anyhow::Error>(server)
    })
}
