use taskrelay_frame::FrameConfig;

/// Default listen host.
pub const DEFAULT_TCP_HOST: &str = "127.0.0.1";
/// Default listen port.
pub const DEFAULT_TCP_PORT: u16 = 7000;
/// Default per-connection bound on replies not yet written.
pub const DEFAULT_MAX_PENDING_REPLIES: usize = 1024;

/// Controls listener and per-connection behavior.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host name or address to bind.
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port.
    pub port: u16,
    /// Line framing limits.
    pub frame: FrameConfig,
    /// Maximum replies a connection may have outstanding before it stops
    /// reading further frames.
    pub max_pending_replies: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_TCP_HOST.to_string(),
            port: DEFAULT_TCP_PORT,
            frame: FrameConfig::default(),
            max_pending_replies: DEFAULT_MAX_PENDING_REPLIES,
        }
    }
}

impl ServerConfig {
    /// `host:port` as given, for logs and errors.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
