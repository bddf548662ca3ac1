//! # wschannel Runtime
//!
//! Application plumbing for wschannel programs:
//!
//! - [`EventLoop`]: the current-thread runtime that drives the channels
//! - [`logging`]: `tracing-subscriber` setup from configuration
//! - [`config`]: figment-based configuration loading and validation
//!
//! ```rust,ignore
//! use wschannel_runtime::{EventLoop, config, logging};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = config::load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     EventLoop::new()?.run(async move {
//!         // create and start channels here, return them to keep them alive
//!         Ok::<_, anyhow::Error>(())
//!     })
//! }
//! ```

pub mod config;
pub mod error;
pub mod event_loop;
pub mod logging;

pub use config::{AppConfig, ConfigError, ConfigLoader, ConfigResult};
pub use error::{RuntimeError, RuntimeResult};
pub use event_loop::{EventLoop, wait_for_shutdown};
pub use logging::{LoggingBuilder, init_from_config};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
