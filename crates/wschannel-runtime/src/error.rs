//! Runtime error types.

use std::io;

use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur while setting up or running an application.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Building the tokio runtime failed.
    #[error("Failed to build event loop: {0}")]
    EventLoop(#[source] io::Error),

    /// Registering a shutdown signal handler failed.
    #[error("Failed to register signal handler: {0}")]
    Signal(#[source] io::Error),

    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
