use std::fs;
use std::net::TcpStream;

use taskrelay_frame::{FrameConfig, FrameError, LineReader, LineWriter};
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{
    frame_error, io_error, CliError, CliResult, FAILURE, HEALTH_CHECK_FAILED, SUCCESS, USAGE,
};
use crate::output::{print_replies, OutputFormat, ReplyKind, ReplyLine};

const HEALTH_CHECK: &[u8] = br#"{"healthCheck":true}"#;

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    if timeout.is_zero() {
        return Err(CliError::new(USAGE, "timeout must be greater than zero"));
    }
    let payloads = resolve_payloads(&args)?;

    let config = FrameConfig {
        read_timeout: Some(timeout),
        write_timeout: Some(timeout),
        ..FrameConfig::default()
    };
    let stream = TcpStream::connect((args.host.as_str(), args.port))
        .map_err(|err| io_error("connect failed", err))?;
    let read_half = stream
        .try_clone()
        .map_err(|err| io_error("connect failed", err))?;
    let mut writer = LineWriter::with_config_tcp(stream, config.clone())
        .map_err(|err| frame_error("connect failed", err))?;
    let mut reader = LineReader::with_config_tcp(read_half, &config)
        .map_err(|err| frame_error("connect failed", err))?;

    for payload in &payloads {
        writer
            .send(payload)
            .map_err(|err| frame_error("send failed", err))?;
    }
    debug!(count = payloads.len(), "tasks sent");

    let mut replies = Vec::with_capacity(payloads.len());
    for _ in 0..payloads.len() {
        match reader.read_frame() {
            Ok(frame) => replies.push(ReplyLine::parse(frame.payload.to_vec())),
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("receive failed", err)),
        }
    }
    print_replies(&replies, format);

    Ok(exit_code(&replies, payloads.len(), args.health))
}

fn exit_code(replies: &[ReplyLine], expected: usize, health: bool) -> i32 {
    if health {
        let ready = replies.first().is_some_and(|reply| reply.kind == ReplyKind::Ready);
        return if ready { SUCCESS } else { HEALTH_CHECK_FAILED };
    }
    let all_answered = replies.len() == expected;
    let any_error = replies
        .iter()
        .any(|reply| matches!(reply.kind, ReplyKind::Error | ReplyKind::Invalid));
    if all_answered && !any_error {
        SUCCESS
    } else {
        FAILURE
    }
}

fn resolve_payloads(args: &SendArgs) -> CliResult<Vec<Vec<u8>>> {
    if args.health {
        return Ok(vec![HEALTH_CHECK.to_vec()]);
    }
    if let Some(json) = &args.json {
        return Ok(vec![validated("--json", json)?]);
    }
    if let Some(path) = &args.file {
        let contents = fs::read_to_string(path).map_err(|err| {
            io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return parse_lines(&contents);
    }
    Err(CliError::new(
        USAGE,
        "nothing to send: pass --json, --file, or --health",
    ))
}

fn parse_lines(contents: &str) -> CliResult<Vec<Vec<u8>>> {
    let payloads = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| validated(&format!("line {}", index + 1), line))
        .collect::<CliResult<Vec<_>>>()?;
    if payloads.is_empty() {
        return Err(CliError::new(USAGE, "task file contains no documents"));
    }
    Ok(payloads)
}

/// Re-encode compactly so a pretty-printed document still fits on one line.
fn validated(source: &str, text: &str) -> CliResult<Vec<u8>> {
    let value = serde_json::from_str::<serde_json::Value>(text)
        .map_err(|err| CliError::new(USAGE, format!("{source} is not valid JSON: {err}")))?;
    serde_json::to_vec(&value)
        .map_err(|err| CliError::new(USAGE, format!("{source} could not be encoded: {err}")))
}
