//! Client Example
//!
//! Connects to a WebSocket server, sends one message once connected and
//! prints everything the server sends back as `>>> text`.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package client
//! cargo run --package client -- --url ws://localhost:9000/chat "hi there"
//! cargo run --package client -- --url wss://localhost:41001/test --ca localhost.crt
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use wschannel::prelude::*;
use wschannel::runtime::config::validate_config;

#[derive(Parser, Debug)]
#[command(name = "client", version, about)]
struct Args {
    /// Configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server URL, ws:// or wss://.
    #[arg(short, long)]
    url: Option<String>,

    /// CA certificate trusted for wss:// URLs.
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Message sent once connected.
    #[arg(default_value = "hello!")]
    message: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ConfigLoader::new().maybe_file(args.config.as_ref()).load()?;
    if let Some(url) = args.url {
        config.client.url = url;
    }
    if let Some(ca) = args.ca {
        config.client.ca_file = Some(ca);
    }
    validate_config(&config)?;
    init_from_config(&config.logging);

    let client_config = config.client;
    let message = args.message;
    EventLoop::new()?.run(async move {
        let print = |_: &ClientContext, text: &str| println!(">>> {text}");
        let channel = match &client_config.ca_file {
            Some(ca_file) => ClientChannel::secure(ca_file, print)?,
            None => ClientChannel::new(print),
        };

        let url = client_config.url.clone();
        channel.connect(client_config.url, move |result| match result {
            Ok(ctx) => {
                info!(url = %url, "Connected");
                if let Err(e) = ctx.send(message.as_str()) {
                    error!(error = %e, "Failed to send message");
                }
            }
            Err(e) => error!(url = %url, error = %e, "Failed to connect"),
        });

        Ok::<_, anyhow::Error>(channel)
    })
}
