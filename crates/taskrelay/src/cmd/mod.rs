use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use taskrelay::TransportKind;
use taskrelay_server::{DEFAULT_MAX_PENDING_REPLIES, DEFAULT_TCP_HOST, DEFAULT_TCP_PORT};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a receiver with a built-in echo handler.
    Serve(ServeArgs),
    /// Send tasks to a receiver and print the replies.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Host to bind.
    #[arg(long, env = "TASKRELAY_HOST", default_value = DEFAULT_TCP_HOST)]
    pub host: String,
    /// Port to bind. Default: 7000 for tcp, 10001 for http.
    #[arg(long, short = 'p', env = "TASKRELAY_PORT")]
    pub port: Option<u16>,
    /// Inbound transport.
    #[arg(long, env = "TASKRELAY_TRANSPORT", default_value = "tcp")]
    pub transport: TransportKind,
    /// Delay every reply (e.g. 500ms, 2s) to simulate a slow handler.
    #[arg(long)]
    pub delay: Option<String>,
    /// `response.statusCode` set on tasks that arrive without one.
    #[arg(long, default_value_t = 200)]
    pub status_code: u16,
    /// Maximum line length in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,
    /// Replies a connection may have outstanding before reading pauses.
    #[arg(long, default_value_t = DEFAULT_MAX_PENDING_REPLIES)]
    pub max_pending: usize,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Receiver host.
    #[arg(long, env = "TASKRELAY_HOST", default_value = DEFAULT_TCP_HOST)]
    pub host: String,
    /// Receiver port.
    #[arg(long, short = 'p', env = "TASKRELAY_PORT", default_value_t = DEFAULT_TCP_PORT)]
    pub port: u16,
    /// One JSON task document.
    #[arg(long, conflicts_with_all = ["file", "health"])]
    pub json: Option<String>,
    /// Read task documents from a file, one per line.
    #[arg(long, conflicts_with_all = ["json", "health"])]
    pub file: Option<PathBuf>,
    /// Send a readiness probe.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub health: bool,
    /// Maximum time to wait for each reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s`, or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if millis {
        Ok(Duration::from_millis(value))
    } else {
        Ok(Duration::from_secs(value))
    }
}
