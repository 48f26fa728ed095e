use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::ServerConfig;
use crate::connection::serve_connection;
use crate::error::{Result, ServerError};
use crate::handler::SharedHandler;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Listens for gateway connections and serves each one concurrently.
///
/// One handler instance is shared by all connections. `stop` closes the
/// listener and every open connection; replies completed afterwards are
/// reported as lost.
pub struct TaskServer {
    config: Arc<ServerConfig>,
    running: Option<Running>,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TaskServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            running: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Resolves once the socket is listening, with the bound address (useful
    /// when the configured port is `0`).
    pub async fn start(&mut self, handler: SharedHandler) -> Result<SocketAddr> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.bind_addr(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(
            accept_loop(
                listener,
                handler,
                Arc::clone(&self.config),
                shutdown.clone(),
            )
            .instrument(info_span!("task_server", %local_addr)),
        );
        info!(%local_addr, "task server listening");

        self.running = Some(Running {
            local_addr,
            shutdown,
            task,
        });
        Ok(local_addr)
    }

    /// Stop accepting, close every connection and wait for them to finish.
    pub async fn stop(&mut self) -> Result<()> {
        let running = self.running.take().ok_or(ServerError::NotRunning)?;
        running.shutdown.cancel();
        if let Err(err) = running.task.await {
            if err.is_panic() {
                error!(error = %err, "accept loop panicked");
            }
        }
        info!(local_addr = %running.local_addr, "task server stopped");
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for TaskServer {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.cancel();
        }
    }
}

impl std::fmt::Debug for TaskServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskServer")
            .field("bind", &self.config.bind_addr())
            .field("local_addr", &self.local_addr())
            .finish()
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: SharedHandler,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let mut connections = JoinSet::new();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(err) = joined {
                    if err.is_panic() {
                        error!(error = %err, "connection task panicked");
                    }
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    next_id += 1;
                    let span = info_span!("connection", id = next_id, %peer);
                    connections.spawn(
                        serve_connection(
                            stream,
                            peer,
                            next_id,
                            Arc::clone(&handler),
                            Arc::clone(&config),
                            shutdown.child_token(),
                        )
                        .instrument(span),
                    );
                }
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }

    drop(listener);
    while let Some(joined) = connections.join_next().await {
        if let Err(err) = joined {
            if err.is_panic() {
                error!(error = %err, "connection task panicked");
            }
        }
    }
}
