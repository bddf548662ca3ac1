//! Single-threaded event loop for channel programs.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::signal;
use tracing::info;

use crate::error::{RuntimeError, RuntimeResult};

/// Time given to released connections to flush their close frames before the
/// loop returns.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// A current-thread tokio runtime that drives every channel created on it.
///
/// # Example
///
/// ```rust,ignore
/// use wschannel::prelude::*;
///
/// fn main() -> anyhow::Result<()> {
///     let event_loop = EventLoop::new()?;
///     event_loop.run(async {
///         let mut server = ServerChannel::new(|ctx: &ServerContext, text: &str| {
///             ctx.send_all(text);
///         });
///         server.listen(41001, "/test").await?;
///         Ok::<_, anyhow::Error>(server)
///     })
/// }
/// ```
pub struct EventLoop {
    runtime: Runtime,
}

impl EventLoop {
    /// Builds the event loop.
    pub fn new() -> RuntimeResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(RuntimeError::EventLoop)?;
        Ok(Self { runtime })
    }

    /// Runs `future` to completion.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Runs `setup`, keeps what it returns alive until Ctrl+C or SIGTERM, then
    /// drops it.
    pub fn run<S, T, E>(&self, setup: S) -> Result<(), E>
    where
        S: Future<Output = Result<T, E>>,
        E: From<RuntimeError>,
    {
        self.block_on(async {
            let guard = setup.await?;
            info!("Event loop running. Press Ctrl+C to stop.");
            wait_for_shutdown().await?;
            release(guard).await;
            Ok::<(), E>(())
        })
    }

    /// Like [`run`](Self::run), but stops when `shutdown` completes.
    pub fn run_until<S, T, E, F>(&self, setup: S, shutdown: F) -> Result<(), E>
    where
        S: Future<Output = Result<T, E>>,
        F: Future<Output = ()>,
    {
        self.block_on(async {
            let guard = setup.await?;
            shutdown.await;
            release(guard).await;
            Ok::<(), E>(())
        })
    }
}

async fn release<T>(guard: T) {
    drop(guard);
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    info!("Event loop stopped");
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
pub async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}
