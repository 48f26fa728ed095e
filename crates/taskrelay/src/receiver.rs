use std::net::SocketAddr;
use std::sync::Arc;

use taskrelay_frame::{FrameConfig, DEFAULT_MAX_FRAME};
use taskrelay_server::{
    ServerConfig, ServerError, SharedHandler, TaskHandler, TaskServer, Transport, TransportKind,
    DEFAULT_MAX_PENDING_REPLIES, DEFAULT_TCP_HOST, DEFAULT_TCP_PORT,
};
use tracing::info;

/// Default port for the HTTP transport.
pub const DEFAULT_HTTP_PORT: u16 = 10001;
/// Default HTTP request body limit in bytes.
pub const DEFAULT_REQUEST_BODY_LIMIT: usize = 4096;

/// Errors returned by [`Receiver`] lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// A required builder argument was never supplied.
    #[error("missing required argument: {0}")]
    MissingArguments(&'static str),

    /// The selected transport has no implementation in this process.
    #[error("no {0} transport is available")]
    TransportUnavailable(TransportKind),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Receiver settings.
#[derive(Debug, Clone)]
pub struct ReceiverOptions {
    pub transport: TransportKind,
    pub host: String,
    /// `None` uses the selected transport's default port.
    pub port: Option<u16>,
    /// Body size limit for the HTTP transport; unused by TCP.
    pub request_body_limit: usize,
    pub max_frame_size: usize,
    pub max_pending_replies: usize,
}

impl Default for ReceiverOptions {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            host: DEFAULT_TCP_HOST.to_string(),
            port: None,
            request_body_limit: DEFAULT_REQUEST_BODY_LIMIT,
            max_frame_size: DEFAULT_MAX_FRAME,
            max_pending_replies: DEFAULT_MAX_PENDING_REPLIES,
        }
    }
}

impl ReceiverOptions {
    /// The port that will be bound.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.transport {
            TransportKind::Tcp => DEFAULT_TCP_PORT,
            TransportKind::Http => DEFAULT_HTTP_PORT,
        })
    }

    /// Server configuration for the TCP transport.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.effective_port(),
            frame: FrameConfig {
                max_frame_size: self.max_frame_size,
                ..FrameConfig::default()
            },
            max_pending_replies: self.max_pending_replies,
        }
    }
}

type StartedCallback = Box<dyn FnOnce(SocketAddr) + Send>;

/// Collects the arguments for [`Receiver`] start-up.
#[must_use]
pub struct ReceiverBuilder {
    options: ReceiverOptions,
    handler: Option<SharedHandler>,
    on_started: Option<StartedCallback>,
    http: Option<Box<dyn Transport>>,
}

impl ReceiverBuilder {
    pub fn options(mut self, options: ReceiverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn handler<H: TaskHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Use a handler that is already shared elsewhere.
    pub fn shared_handler(mut self, handler: SharedHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Called once with the bound address after the transport is listening.
    pub fn on_started<F>(mut self, on_started: F) -> Self
    where
        F: FnOnce(SocketAddr) + Send + 'static,
    {
        self.on_started = Some(Box::new(on_started));
        self
    }

    /// Supply the implementation used when the options select HTTP.
    pub fn http_transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.http = Some(Box::new(transport));
        self
    }

    /// Validate the arguments, start the selected transport, then run the
    /// started callback.
    ///
    /// Argument errors are reported before any socket is opened.
    pub async fn start(self) -> Result<Receiver, ReceiverError> {
        let handler = self
            .handler
            .ok_or(ReceiverError::MissingArguments("handler"))?;
        let on_started = self
            .on_started
            .ok_or(ReceiverError::MissingArguments("on_started"))?;

        let mut transport: Box<dyn Transport> = match self.options.transport {
            TransportKind::Tcp => Box::new(TaskServer::new(self.options.server_config())),
            TransportKind::Http => self
                .http
                .ok_or(ReceiverError::TransportUnavailable(TransportKind::Http))?,
        };

        let local_addr = transport.start(handler).await?;
        info!(transport = %transport.kind(), %local_addr, "receiver started");
        on_started(local_addr);

        Ok(Receiver {
            transport,
            local_addr,
        })
    }
}

/// A running receiver owning one transport instance.
pub struct Receiver {
    transport: Box<dyn Transport>,
    local_addr: SocketAddr,
}

impl Receiver {
    pub fn builder() -> ReceiverBuilder {
        ReceiverBuilder {
            options: ReceiverOptions::default(),
            handler: None,
            on_started: None,
            http: None,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn transport(&self) -> TransportKind {
        self.transport.kind()
    }

    /// Stop listening, close every open connection, and wait for the
    /// listener to finish.
    pub async fn stop(&mut self) -> Result<(), ReceiverError> {
        self.transport.stop().await?;
        info!(transport = %self.transport.kind(), "receiver stopped");
        Ok(())
    }
}

impl std::fmt::Debug for Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("transport", &self.transport.kind())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
