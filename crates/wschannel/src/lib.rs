//! # wschannel
//!
//! WebSocket channels with text-message callbacks, in plain (`ws://`) and
//! secure (`wss://`) flavors.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  Application         │  (handlers, callbacks)
//! ├──────────────────────┤
//! │  wschannel-runtime   │  EventLoop, logging, config
//! ├──────────────────────┤
//! │  wschannel-transport │  ClientChannel, ServerChannel, TLS
//! ├──────────────────────┤
//! │  wschannel-core      │  errors, registry, handler traits
//! └──────────────────────┘
//! ```
//!
//! - **ClientChannel**: one outbound connection, with connect, reconnect,
//!   send and close
//! - **ServerChannel**: accepts connections on one path and keeps them in a
//!   registry until they close; `send_all` broadcasts to every peer
//! - **Handlers**: `on_message` receives each inbound text frame; binary
//!   frames are logged and dropped
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wschannel::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     EventLoop::new()?.run(async {
//!         let mut server = ServerChannel::new(|ctx: &ServerContext, text: &str| {
//!             ctx.send_all(text);
//!         });
//!         server.listen(41001, "/test").await?;
//!         Ok::<_, anyhow::Error>(server)
//!     })
//! }
//! ```
//!
//! ## Features
//!
//! - `client` (default): [`ClientChannel`](transport::ClientChannel)
//! - `server` (default): [`ServerChannel`](transport::ServerChannel)
//! - `toml-config` (default) / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output

pub use wschannel_core as core;
pub use wschannel_runtime as runtime;
pub use wschannel_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use wschannel::prelude::*;
/// ```
pub mod prelude {
    // Channels
    #[cfg(feature = "client")]
    pub use wschannel_transport::{ClientChannel, ConnectResult};
    #[cfg(feature = "server")]
    pub use wschannel_transport::ServerChannel;

    // Handlers and what they receive
    pub use wschannel_core::{
        ClientContext, ClientHandler, ConnectionId, NoopHandler, ServerContext, ServerHandler,
        async_trait,
    };

    // Errors and lifecycle
    pub use wschannel_core::{ChannelError, ChannelMode, ChannelResult, ChannelState};

    // Runtime
    pub use wschannel_runtime::{AppConfig, ConfigLoader, EventLoop, init_from_config};
}
