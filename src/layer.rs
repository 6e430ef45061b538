use serde_json::{Map, Value};
use std::error::Error;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::fields::EXCEPTION;
use crate::level::Level;
use crate::pipeline::Pipeline;
use crate::record::{CapturedError, LogCall};

/// Marker field set by [`critical!`](crate::critical) to raise an `ERROR`
/// event to [`Level::Critical`]. Consumed, never rendered.
pub const CRITICAL_MARKER: &str = "critical";

/// `tracing_subscriber` layer that feeds every event into the application
/// [`Pipeline`].
///
/// Processing runs inline on the thread that emitted the event; there is
/// no channel and no background task. Events below the pipeline threshold
/// are dropped before their fields are visited.
pub struct StructuredLayer {
    pipeline: Arc<Pipeline>,
}

impl StructuredLayer {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }
}

impl<S> Layer<S> for StructuredLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut level = Level::from_tracing(meta.level());

        // ERROR events may still carry the critical marker.
        if level < Level::Error && !self.pipeline.enabled(level) {
            self.pipeline.stats().suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        if visitor.critical {
            level = Level::Critical;
        }

        let location = if self.pipeline.config().include_location {
            meta.module_path().map(|module| match meta.line() {
                Some(line) => format!("{}:{}", module, line),
                None => module.to_string(),
            })
        } else {
            None
        };

        self.pipeline.emit(LogCall {
            level,
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
            exception: visitor.exception,
            location,
        });
    }
}

/// Collects the fields of one `tracing` event.
///
/// `message` becomes the record message, an error recorded under
/// `exception` becomes the attached error, and every other field is kept
/// as a JSON value.
#[derive(Debug, Default)]
pub struct FieldVisitor {
    pub message: Option<String>,
    pub fields: Map<String, Value>,
    pub exception: Option<CapturedError>,
    pub critical: bool,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        match i64::try_from(value) {
            Ok(v) => self.insert(field, Value::from(v)),
            Err(_) => self.insert(field, Value::String(value.to_string())),
        }
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        match u64::try_from(value) {
            Ok(v) => self.insert(field, Value::from(v)),
            Err(_) => self.insert(field, Value::String(value.to_string())),
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        if field.name() == CRITICAL_MARKER {
            self.critical = value;
        } else {
            self.insert(field, Value::from(value));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if field.name() == EXCEPTION {
            self.exception = Some(CapturedError::from_error(value).with_captured_backtrace());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // Formatted messages (`info!("x = {}", x)`) arrive here.
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, Value::String(format!("{:?}", value)));
        }
    }
}
