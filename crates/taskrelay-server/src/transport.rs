use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use futures_util::future::BoxFuture;

use crate::error::Result;
use crate::handler::SharedHandler;
use crate::server::TaskServer;

/// Which inbound transport a receiver runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransportKind {
    #[default]
    Tcp,
    Http,
}

impl TransportKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportKind::Tcp),
            "http" => Ok(TransportKind::Http),
            other => Err(format!("unknown transport '{other}' (expected tcp or http)")),
        }
    }
}

/// A started-and-stoppable inbound transport feeding a [`SharedHandler`].
///
/// The TCP transport is [`TaskServer`]. Other transports plug in through this
/// trait.
pub trait Transport: Send {
    fn kind(&self) -> TransportKind;

    /// Start listening; resolves with the bound address.
    fn start(&mut self, handler: SharedHandler) -> BoxFuture<'_, Result<SocketAddr>>;

    /// Stop listening and release every connection.
    fn stop(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Bound address while running.
    fn local_addr(&self) -> Option<SocketAddr>;
}

impl Transport for TaskServer {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn start(&mut self, handler: SharedHandler) -> BoxFuture<'_, Result<SocketAddr>> {
        Box::pin(TaskServer::start(self, handler))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(TaskServer::stop(self))
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        TaskServer::local_addr(self)
    }
}
