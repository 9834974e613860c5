//! MCP server lifecycle.
//!
//! [`McpServer`] wires the components together and owns them for the life of
//! the process:
//!
//! 1. **Construction**: state store, registries, screenshot capabilities and
//!    the dispatcher are built from [`Config`].
//! 2. **Operation**: the axum router is served on a TCP listener while a
//!    background task sweeps expired tasks.
//! 3. **Shutdown**: on SIGINT/SIGTERM (Ctrl+C on Windows) the listener stops
//!    accepting connections and open streams get a short grace period.

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::dispatch::Dispatcher;
use super::transport;
use crate::config::Config;
use crate::registry::{PromptRegistry, ResourceRegistry, ToolRegistry};
use crate::screenshot::{Collaborators, ScreenshotService};
use crate::state::StateStore;

/// How long open connections (mostly SSE streams) may linger after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The assembled MCP server.
pub struct McpServer {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    screenshots: Arc<ScreenshotService>,
}

impl McpServer {
    /// Builds a server with the default, process-backed collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the analysis HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::with_collaborators(config, collaborators))
    }

    /// Builds a server around the given collaborators.
    #[must_use]
    pub fn with_collaborators(config: Config, collaborators: Collaborators) -> Self {
        let state = Arc::new(StateStore::new(config.server.queue_capacity));
        let tools = Arc::new(ToolRegistry::new());
        let resources = Arc::new(ResourceRegistry::new());
        let prompts = Arc::new(PromptRegistry::new());
        let analyzer = Arc::clone(&collaborators.analyzer);

        let screenshots = Arc::new(ScreenshotService::new(
            collaborators,
            Arc::clone(&state),
            config.capture.temp_dir.clone(),
            config.server.task_ttl(),
        ));
        screenshots.register(&tools, &resources, &prompts);

        debug!(
            tools = tools.len(),
            resources = resources.len(),
            prompts = prompts.len(),
            "Capabilities registered"
        );

        let dispatcher = Arc::new(Dispatcher::new(state, tools, resources, prompts, analyzer));

        Self {
            config,
            dispatcher,
            screenshots,
        }
    }

    /// The request dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The shared state store.
    #[must_use]
    pub fn state(&self) -> &Arc<StateStore> {
        self.dispatcher.state()
    }

    /// The screenshot capabilities.
    #[must_use]
    pub const fn screenshots(&self) -> &Arc<ScreenshotService> {
        &self.screenshots
    }

    /// The HTTP router serving `/mcp`.
    #[must_use]
    pub fn router(&self) -> Router {
        transport::router(
            Arc::clone(&self.dispatcher),
            self.config.server.sse_idle_timeout(),
        )
    }

    /// Binds the configured address and serves until a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound, signal handlers
    /// cannot be installed, or the server fails.
    pub async fn run(self) -> io::Result<()> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let shutdown = shutdown_signal()?;
        self.serve(listener, shutdown).await
    }

    /// Serves on `listener` until `shutdown` completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(addr = %listener.local_addr()?, "Listening for MCP connections");

        let sweeper = spawn_task_sweeper(
            Arc::clone(self.state()),
            self.config.server.task_sweep_interval(),
        );

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
            let _ = stop_rx.await;
        });
        let mut server = tokio::spawn(async move { server.await });

        let result = tokio::select! {
            joined = &mut server => flatten(joined),
            () = shutdown => {
                let _ = stop_tx.send(());
                match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                    Ok(joined) => flatten(joined),
                    Err(_) => {
                        warn!(
                            grace_secs = SHUTDOWN_GRACE.as_secs(),
                            "Open connections did not close in time, dropping them"
                        );
                        server.abort();
                        Ok(())
                    }
                }
            }
        };

        sweeper.abort();
        result
    }
}

fn flatten(joined: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    joined.map_err(io::Error::other)?
}

/// Periodically deletes tasks whose TTL has elapsed.
///
/// The first sweep happens one `period` after spawning.
pub fn spawn_task_sweeper(state: Arc<StateStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            let expired = state.cleanup_expired_tasks().await;
            if !expired.is_empty() {
                debug!(count = expired.len(), "Swept expired tasks");
            }
        }
    })
}

/// Resolves when the process is asked to stop.
#[cfg(unix)]
fn shutdown_signal() -> io::Result<impl Future<Output = ()> + Send + 'static> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, initiating graceful shutdown");
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
            }
        }
    })
}

/// Resolves when the process is asked to stop.
#[cfg(windows)]
fn shutdown_signal() -> io::Result<impl Future<Output = ()> + Send + 'static> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl+C, running until killed");
                std::future::pending::<()>().await;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_tasks() {
        let state = Arc::new(StateStore::default());
        state
            .create_task("short", "job", None, Some(Duration::from_secs(10)))
            .await;
        state.create_task("forever", "job", None, None).await;

        let sweeper = spawn_task_sweeper(Arc::clone(&state), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert!(state.get_task("short").await.is_none());
        assert!(state.get_task("forever").await.is_some());
        sweeper.abort();
    }
}
