use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// What a reply line turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Task,
    Error,
    Ready,
    Invalid,
}

impl ReplyKind {
    fn as_str(self) -> &'static str {
        match self {
            ReplyKind::Task => "task",
            ReplyKind::Error => "error",
            ReplyKind::Ready => "ready",
            ReplyKind::Invalid => "invalid",
        }
    }
}

/// A reply line read back from the server.
#[derive(Debug)]
pub struct ReplyLine {
    pub kind: ReplyKind,
    pub raw: Vec<u8>,
    pub value: Option<Value>,
}

impl ReplyLine {
    pub fn parse(raw: Vec<u8>) -> Self {
        let value = serde_json::from_slice::<Value>(&raw).ok();
        let kind = match &value {
            Some(Value::Object(map)) if map.get("isError") == Some(&Value::Bool(true)) => {
                ReplyKind::Error
            }
            Some(Value::Object(map))
                if map.len() == 1 && map.get("status").and_then(Value::as_str) == Some("ready") =>
            {
                ReplyKind::Ready
            }
            Some(Value::Object(_)) => ReplyKind::Task,
            _ => ReplyKind::Invalid,
        };
        Self { kind, raw, value }
    }

    fn task_id(&self) -> Option<&str> {
        self.value.as_ref()?.get("taskId")?.as_str()
    }

    fn detail(&self) -> String {
        let Some(value) = &self.value else {
            return payload_preview(&self.raw);
        };
        match self.kind {
            ReplyKind::Error => {
                let message = value["debugMessage"].as_str().unwrap_or_default();
                match value.get("error") {
                    Some(Value::String(error)) => format!("{message}: {error}"),
                    Some(error) => format!("{message}: {error}"),
                    None => message.to_string(),
                }
            }
            ReplyKind::Ready => "ready".to_string(),
            ReplyKind::Task => match value.pointer("/response/statusCode") {
                Some(code) => format!("statusCode={code}"),
                None => String::new(),
            },
            ReplyKind::Invalid => payload_preview(&self.raw),
        }
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    index: usize,
    kind: ReplyKind,
    task_id: Option<&'a str>,
    size: usize,
    reply: Option<&'a Value>,
    timestamp: String,
}

pub fn print_replies(replies: &[ReplyLine], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for (index, reply) in replies.iter().enumerate() {
                let out = ReplyOutput {
                    index,
                    kind: reply.kind,
                    task_id: reply.task_id(),
                    size: reply.raw.len(),
                    reply: reply.value.as_ref(),
                    timestamp: now_unix_seconds(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "KIND", "TASK ID", "DETAIL"]);
            for (index, reply) in replies.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    reply.kind.as_str().to_string(),
                    reply.task_id().unwrap_or("-").to_string(),
                    reply.detail(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (index, reply) in replies.iter().enumerate() {
                println!(
                    "#{index} {} task_id={} size={} {}",
                    reply.kind.as_str(),
                    reply.task_id().unwrap_or("-"),
                    reply.raw.len(),
                    reply.detail()
                );
            }
        }
        OutputFormat::Raw => {
            let mut out = std::io::stdout().lock();
            for reply in replies {
                let _ = out.write_all(&reply.raw);
                let _ = out.write_all(b"\n");
            }
            let _ = out.flush();
        }
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
