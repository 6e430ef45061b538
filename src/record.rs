use serde_json::{Map, Value};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error;

use crate::context::ContextMap;
use crate::fields::{self, DATA, EXCEPTION, LEVEL, MESSAGE, REQUEST_ID};
use crate::level::Level;

/// An error value attached to a log call under the `exception` key.
///
/// Holds everything the [`ExceptionNormalizer`](crate::exception::ExceptionNormalizer)
/// needs to render a trace, already detached from the borrowed error so the
/// record can outlive the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    pub message: String,
    /// `Display` of each error in the `source()` chain, outermost first.
    pub sources: Vec<String>,
    pub backtrace: Option<String>,
}

impl CapturedError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            sources: Vec::new(),
            backtrace: None,
        }
    }

    /// Capture an error and walk its `source()` chain.
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        let mut sources = Vec::new();
        let mut next = err.source();
        while let Some(source) = next {
            sources.push(source.to_string());
            next = source.source();
        }

        Self {
            message: err.to_string(),
            sources,
            backtrace: None,
        }
    }

    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        let backtrace = backtrace.into();
        self.backtrace = if backtrace.trim().is_empty() { None } else { Some(backtrace) };
        self
    }

    /// Attach the current call stack if `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`
    /// enable capturing. Otherwise a no-op.
    pub fn with_captured_backtrace(self) -> Self {
        let backtrace = Backtrace::capture();
        match backtrace.status() {
            BacktraceStatus::Captured => self.with_backtrace(backtrace.to_string()),
            _ => self,
        }
    }

    /// Unrendered form, used when the value has to be put back as data.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("message".to_string(), Value::String(self.message.clone()));
        if !self.sources.is_empty() {
            map.insert(
                "sources".to_string(),
                Value::Array(self.sources.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(backtrace) = &self.backtrace {
            map.insert("backtrace".to_string(), Value::String(backtrace.clone()));
        }
        Value::Object(map)
    }
}

/// One log call as emitted by a call site, before any processing.
#[derive(Debug, Clone, PartialEq)]
pub struct LogCall {
    pub level: Level,
    pub message: String,
    pub fields: Map<String, Value>,
    pub exception: Option<CapturedError>,
    /// Static `module:line` of the call site, when the facade knows it.
    pub location: Option<String>,
}

impl LogCall {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            fields: Map::new(),
            exception: None,
            location: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_exception(mut self, exception: CapturedError) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Value parked by the exception step between detection and rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingTrace {
    /// A real error value; can be rendered.
    Captured(CapturedError),
    /// Whatever else was logged under `exception`; passed through as-is.
    Raw(Value),
}

/// Key/value state of one log call while it flows through the pipeline.
///
/// Keys live in a flat map; the only nested structure is the `data` object
/// built by [`relocate_extra_fields`](crate::fields::relocate_extra_fields).
/// An attached error sits in a side slot until the exception step consumes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventRecord {
    entries: Map<String, Value>,
    exception: Option<CapturedError>,
}

impl EventRecord {
    /// Seed a record from caller-supplied data.
    ///
    /// Caller keys that name a root field are stored under `data` right away:
    /// root fields are owned by the pipeline, and nothing is dropped.
    pub fn new(message: impl Into<String>, fields: Map<String, Value>, exception: Option<CapturedError>) -> Self {
        let mut record = Self {
            entries: Map::new(),
            exception,
        };
        record
            .entries
            .insert(MESSAGE.to_string(), Value::String(message.into()));

        for (key, value) in fields {
            record.insert_foreign(key, value);
        }
        record
    }

    /// Build a record from already-shaped entries, e.g. after relocation.
    pub(crate) fn from_parts(entries: Map<String, Value>, exception: Option<CapturedError>) -> Self {
        Self { entries, exception }
    }

    /// Merge ambient context. Call-supplied keys win, except `requestId`,
    /// which only ever comes from the context.
    pub fn merge_context(&mut self, context: &ContextMap) {
        for (key, value) in context {
            if key == REQUEST_ID {
                self.entries.insert(key.clone(), value.clone());
            } else if !self.entries.contains_key(key) {
                self.insert_foreign(key.clone(), value.clone());
            }
        }
    }

    /// Insert a key that did not come from the pipeline itself.
    fn insert_foreign(&mut self, key: String, value: Value) {
        if !fields::is_root_field(&key) {
            self.entries.insert(key, value);
            return;
        }

        let data = self
            .entries
            .entry(DATA.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(data) = data {
            data.entry(key).or_insert(value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn entries(&self) -> &Map<String, Value> {
        &self.entries
    }

    pub fn level(&self) -> Option<Level> {
        self.entries
            .get(LEVEL)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn message(&self) -> Option<&str> {
        self.entries.get(MESSAGE).and_then(Value::as_str)
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.entries.get(DATA).and_then(Value::as_object)
    }

    pub fn exception(&self) -> Option<&CapturedError> {
        self.exception.as_ref()
    }

    /// Detach whatever is attached under `exception`, if anything.
    pub fn take_pending_trace(&mut self) -> Option<PendingTrace> {
        if let Some(captured) = self.exception.take() {
            return Some(PendingTrace::Captured(captured));
        }
        self.entries.remove(EXCEPTION).map(PendingTrace::Raw)
    }

    /// The record as a JSON object. Keys sort lexicographically.
    pub fn to_json(&self) -> Value {
        let mut entries = self.entries.clone();
        if let Some(exception) = &self.exception {
            entries
                .entry(EXCEPTION.to_string())
                .or_insert_with(|| exception.to_value());
        }
        Value::Object(entries)
    }
}
