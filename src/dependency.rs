//! Dependency channel: records from libraries that log through the `log`
//! facade.
//!
//! Which pipeline a record goes to is decided by the facade it was emitted
//! through, never by inspecting the call stack.

use log::kv::{self, VisitSource};
use serde_json::{Map, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::fields::EXCEPTION;
use crate::level::Level;
use crate::pipeline::Pipeline;
use crate::record::{CapturedError, LogCall};

/// Free-form key holding the `log` target (usually the library's module).
pub const LOGGER: &str = "logger";

/// `log::Log` implementation feeding the dependency [`Pipeline`].
pub struct DependencyLogger {
    pipeline: Arc<Pipeline>,
}

impl DependencyLogger {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

impl log::Log for DependencyLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.pipeline.enabled(Level::from_log(metadata.level()))
    }

    fn log(&self, record: &log::Record<'_>) {
        let level = Level::from_log(record.level());
        if !self.pipeline.enabled(level) {
            self.pipeline.stats().suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut collector = KvCollector::default();
        // A failing visit only loses the remaining pairs.
        let _ = record.key_values().visit(&mut collector);

        let mut fields = collector.fields;
        fields
            .entry(LOGGER.to_string())
            .or_insert_with(|| Value::String(record.target().to_string()));

        let location = if self.pipeline.config().include_location {
            record.module_path().map(|module| match record.line() {
                Some(line) => format!("{}:{}", module, line),
                None => module.to_string(),
            })
        } else {
            None
        };

        self.pipeline.emit(LogCall {
            level,
            message: record.args().to_string(),
            fields,
            exception: collector.exception,
            location,
        });
    }

    fn flush(&self) {
        self.pipeline.flush();
    }
}

#[derive(Default)]
struct KvCollector {
    fields: Map<String, Value>,
    exception: Option<CapturedError>,
}

impl<'kvs> VisitSource<'kvs> for KvCollector {
    fn visit_pair(&mut self, key: kv::Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        if key.as_str() == EXCEPTION {
            if let Some(err) = value.to_borrowed_error() {
                self.exception = Some(CapturedError::from_error(err).with_captured_backtrace());
                return Ok(());
            }
        }
        self.fields.insert(key.as_str().to_string(), to_json(&value));
        Ok(())
    }
}

fn to_json(value: &kv::Value<'_>) -> Value {
    if let Some(b) = value.to_bool() {
        Value::from(b)
    } else if let Some(i) = value.to_i64() {
        Value::from(i)
    } else if let Some(u) = value.to_u64() {
        Value::from(u)
    } else if let Some(f) = value.to_f64() {
        Value::from(f)
    } else if let Some(s) = value.to_borrowed_str() {
        Value::String(s.to_string())
    } else {
        Value::String(value.to_string())
    }
}
