//! # wschannel Transport
//!
//! WebSocket channels built on the types in `wschannel-core`.
//!
//! ## Features
//!
//! - `client` (default): [`ClientChannel`], backed by tokio-tungstenite
//! - `server` (default): [`ServerChannel`], backed by axum
//!
//! Both channel types come in a plain (`ws://`) and a secure (`wss://`)
//! flavor. Secure channels use rustls with PEM material loaded by the
//! [`tls`] module.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wschannel_core::{ClientContext, ServerContext};
//! use wschannel_transport::{ClientChannel, ServerChannel};
//!
//! let mut server = ServerChannel::new(|ctx: &ServerContext, text: &str| {
//!     ctx.send_all(text);
//! });
//! server.listen(41001, "/test").await?;
//!
//! let client = ClientChannel::new(|_: &ClientContext, text: &str| {
//!     println!(">>> {text}");
//! });
//! let ctx = client.open("ws://localhost:41001/test").await?;
//! ctx.send("hello!")?;
//! ```

pub mod tls;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "server")]
mod listener;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "client")]
pub use client::{ClientChannel, ConnectResult};

#[cfg(feature = "server")]
pub use server::ServerChannel;
