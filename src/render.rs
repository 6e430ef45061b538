//! Turning a finished [`EventRecord`] into one line of output.

use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::env::Environment;
use crate::error::RenderError;
use crate::fields::{DATA, EXCEPTION, LEVEL, MESSAGE, STACKTRACE, TIMESTAMP};
use crate::record::EventRecord;

/// Serializes a finished record. Writing the result is the sink's job.
pub trait Renderer: Send + Sync {
    fn render(&self, record: &EventRecord) -> Result<String, RenderError>;
}

/// One JSON object per line, keys sorted lexicographically at every level.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, record: &EventRecord) -> Result<String, RenderError> {
        Ok(serde_json::to_string(&sort_keys(record.to_json()))?)
    }
}

// Rebuilding maps in key order keeps the output sorted even when
// serde_json is compiled with `preserve_order`.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, sort_keys(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Human-facing console line:
///
/// ```text
/// 2026-10-18T09:30:00.000000Z [error    ] login failed    component=auth user_id=42
/// ```
///
/// A trace, when present, follows on its own lines.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleRenderer;

const MESSAGE_PAD: usize = 30;

impl Renderer for ConsoleRenderer {
    fn render(&self, record: &EventRecord) -> Result<String, RenderError> {
        let entries = record.entries();
        let mut out = String::new();

        if let Some(timestamp) = entries.get(TIMESTAMP).and_then(Value::as_str) {
            write!(out, "{timestamp} ")?;
        }
        let level = entries.get(LEVEL).and_then(Value::as_str).unwrap_or("-");
        write!(out, "[{level:<9}] ")?;
        let message = entries.get(MESSAGE).and_then(Value::as_str).unwrap_or_default();
        write!(out, "{message:<width$}", width = MESSAGE_PAD)?;

        let mut trace = entries.get(STACKTRACE).and_then(Value::as_str);
        for (key, value) in entries {
            if matches!(key.as_str(), TIMESTAMP | LEVEL | MESSAGE | DATA | STACKTRACE) {
                continue;
            }
            write_pair(&mut out, key, value)?;
        }

        if let Some(data) = record.data() {
            for (key, value) in data {
                if key == EXCEPTION {
                    if let Some(text) = value.as_str() {
                        trace = trace.or(Some(text));
                        continue;
                    }
                }
                write_pair(&mut out, key, value)?;
            }
        }

        let mut out = out.trim_end().to_string();
        if let Some(trace) = trace {
            out.push('\n');
            out.push_str(trace.trim_end());
        }
        Ok(out)
    }
}

fn write_pair(out: &mut String, key: &str, value: &Value) -> std::fmt::Result {
    match value {
        Value::String(s) if !s.is_empty() && !s.contains(char::is_whitespace) => {
            write!(out, " {key}={s}")
        }
        other => write!(out, " {key}={other}"),
    }
}

/// Console output locally, JSON once a deployment marker is present.
pub fn renderer_for(environment: &Environment) -> Arc<dyn Renderer> {
    if environment.is_local() {
        Arc::new(ConsoleRenderer)
    } else {
        Arc::new(JsonRenderer)
    }
}
