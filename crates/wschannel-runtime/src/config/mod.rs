//! Configuration for wschannel applications.
//!
//! Settings are read from TOML (or YAML) files and `WSCHANNEL_*` environment
//! variables, then checked by [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, load_config, load_config_from_file};
pub use schema::{
    AppConfig, ClientConfig, LogFormat, LogLevel, LogOutput, LoggingConfig, ServerConfig,
    ServerTlsConfig, SpanEventConfig,
};
pub use validation::validate_config;
