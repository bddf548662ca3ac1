//! # wschannel Core
//!
//! Transport-independent building blocks shared by the client and server
//! channels:
//!
//! - **Errors**: [`ChannelError`], [`TlsError`], [`RegistryError`]
//! - **Lifecycle**: [`ChannelMode`] (plain or secure) and [`ChannelState`]
//! - **Registry**: [`ConnectionRegistry`] keyed by generated [`ConnectionId`]s
//! - **Handles**: [`PeerHandle`] for one live connection, [`PeerSet`] for a
//!   server's shared registry
//! - **Extension points**: [`ClientHandler`] and [`ServerHandler`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use wschannel_core::{ServerContext, ServerHandler};
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ServerHandler for Echo {
//!     async fn on_message(&self, ctx: &ServerContext, text: &str) {
//!         ctx.send_all(text);
//!     }
//! }
//! ```

pub mod connection;
pub mod error;
pub mod handler;
pub mod registry;
pub mod state;

pub use connection::{PeerHandle, PeerSet};
pub use error::{ChannelError, ChannelResult, RegistryError, TlsError, TlsResult};
pub use handler::{ClientContext, ClientHandler, NoopHandler, ServerContext, ServerHandler};
pub use registry::{ConnectionId, ConnectionRegistry, RegistryStats};
pub use state::{ChannelMode, ChannelState};

// Re-exported so handler implementations do not need a direct dependency.
pub use async_trait::async_trait;
