//! The ordered processing applied to every log call.
//!
//! ```text
//! LogCall
//!   -> merge context          (requestId and other ambient bindings)
//!   -> level + type           (type is derived from the final level)
//!   -> timestamp              (once, ISO-8601 UTC)
//!   -> environment, component
//!   -> source                 (fixed per pipeline instance)
//!   -> location, error prefix (both optional)
//!   -> exception              (render and route the attached error)
//!   -> relocate extra fields  (everything non-root goes under `data`)
//!   -> Renderer -> LogSink
//! ```
//!
//! Two instances exist per process, one per [`Source`]. They share the same
//! configuration and differ only in the `source` stamp.

use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context;
use crate::error::EmitError;
use crate::exception::ExceptionNormalizer;
use crate::fields::{
    self, classify_type, EventType, Source, COMPONENT, ENVIRONMENT, LEVEL, MESSAGE, SOURCE,
    TIMESTAMP, TYPE,
};
use crate::init::LoggingConfig;
use crate::level::Level;
use crate::record::{EventRecord, LogCall};
use crate::render::Renderer;
use crate::sink::LogSink;

/// Free-form key holding the static call site, when enabled.
pub const FILE: &str = "file";
/// Where a caller-supplied `file` value is moved to.
pub const FILE_ORIGINAL: &str = "file_original";

/// Counters kept by a [`Pipeline`].
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Records rendered and written.
    pub emitted: AtomicU64,
    /// Calls below the threshold, never processed.
    pub suppressed: AtomicU64,
    /// Records lost because rendering or writing failed.
    pub failed: AtomicU64,
}

/// One configured processing chain feeding a renderer and a sink.
///
/// Everything in here is fixed at construction; `process` and `emit` only
/// touch the record they are given, so a pipeline can be shared freely
/// between threads and tasks.
pub struct Pipeline {
    config: Arc<LoggingConfig>,
    source: Source,
    threshold: Level,
    normalizer: ExceptionNormalizer,
    renderer: Arc<dyn Renderer>,
    sink: Arc<dyn LogSink>,
    stats: PipelineStats,
}

impl Pipeline {
    pub fn new(
        config: Arc<LoggingConfig>,
        source: Source,
        renderer: Arc<dyn Renderer>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            threshold: config.threshold(),
            normalizer: ExceptionNormalizer::new(&config.environment),
            config,
            source,
            renderer,
            sink,
            stats: PipelineStats::default(),
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    pub fn threshold(&self) -> Level {
        self.threshold
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.threshold
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Run every processing step and return the finished record.
    ///
    /// Ignores the threshold; see [`Pipeline::emit`].
    pub fn process(&self, call: LogCall) -> EventRecord {
        let LogCall {
            level,
            message,
            fields,
            exception,
            location,
        } = call;
        let started_at = Utc::now();

        let mut record = EventRecord::new(message, fields, exception);
        merge_context(&mut record);
        stamp_level_and_type(&mut record, level);
        stamp_timestamp(&mut record, started_at);
        stamp_environment_and_component(&mut record, &self.config);
        stamp_source(&mut record, self.source);
        if self.config.include_location {
            add_location(&mut record, location.as_deref());
        }
        if let Some(prefix) = self.config.error_message_prefix.as_deref() {
            prefix_error_message(&mut record, prefix);
        }
        self.normalizer.normalize(&mut record);
        fields::relocate_extra_fields(&record)
    }

    /// Process, render and write one call if it passes the threshold.
    ///
    /// Never fails: render or write errors are reported on stderr.
    pub fn emit(&self, call: LogCall) {
        if let Err(e) = self.try_emit(call) {
            eprintln!("structured log record dropped: {}", e);
        }
    }

    /// Like [`Pipeline::emit`], but hands the failure back.
    pub fn try_emit(&self, call: LogCall) -> Result<(), EmitError> {
        if !self.enabled(call.level) {
            self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.try_emit_unfiltered(call)
    }

    /// Process, render and write one call whatever its level.
    ///
    /// Reserved for records that must not be lost to the threshold, such as
    /// a panic report.
    pub fn try_emit_unfiltered(&self, call: LogCall) -> Result<(), EmitError> {
        let record = self.process(call);
        let result = self
            .renderer
            .render(&record)
            .map_err(EmitError::from)
            .and_then(|line| self.sink.write_line(&line).map_err(EmitError::from));

        match &result {
            Ok(()) => self.stats.emitted.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.stats.failed.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    pub fn flush(&self) {
        if let Err(e) = self.sink.flush() {
            eprintln!("error flushing log sink: {}", e);
        }
    }
}

fn merge_context(record: &mut EventRecord) {
    record.merge_context(&context::snapshot());
}

// `type` is a root field, so it has to exist before relocation runs.
fn stamp_level_and_type(record: &mut EventRecord, level: Level) {
    record.insert(LEVEL, level.as_str());
    record.insert(TYPE, classify_type(level).as_str());
}

fn stamp_timestamp(record: &mut EventRecord, at: DateTime<Utc>) {
    if !record.contains_key(TIMESTAMP) {
        record.insert(TIMESTAMP, at.to_rfc3339_opts(SecondsFormat::Micros, true));
    }
}

fn stamp_environment_and_component(record: &mut EventRecord, config: &LoggingConfig) {
    if let Some(environment) = config.environment.name() {
        record.insert(ENVIRONMENT, environment);
    }
    if let Some(component) = config.component.as_deref() {
        record.insert(COMPONENT, component);
    }
}

fn stamp_source(record: &mut EventRecord, source: Source) {
    record.insert(SOURCE, source.as_str());
}

fn add_location(record: &mut EventRecord, location: Option<&str>) {
    let Some(location) = location else {
        return;
    };
    if let Some(existing) = record.remove(FILE) {
        record.insert(FILE_ORIGINAL, existing);
    }
    record.insert(FILE, location);
}

fn prefix_error_message(record: &mut EventRecord, prefix: &str) {
    let is_error = record
        .level()
        .map(|level| classify_type(level) == EventType::Error)
        .unwrap_or(false);
    if !is_error {
        return;
    }
    let message = record.message().unwrap_or_default();
    let prefixed = format!("{prefix}{message}");
    record.insert(MESSAGE, prefixed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::fields::{DATA, EXCEPTION, REQUEST_ID, STACKTRACE};
    use crate::record::CapturedError;
    use crate::render::JsonRenderer;
    use crate::sink::MemorySink;
    use serde_json::json;

    fn pipeline(config: LoggingConfig, source: Source) -> (Pipeline, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let pipeline = Pipeline::new(Arc::new(config), source, Arc::new(JsonRenderer), sink.clone());
        (pipeline, sink)
    }

    fn deployed(component: &str) -> LoggingConfig {
        LoggingConfig::new(component).with_environment(Environment::deployed("prod"))
    }

    #[test]
    fn critical_with_exception_when_deployed() {
        let (pipeline, _) = pipeline(deployed("test"), Source::Application);
        let call = LogCall::new(Level::Critical, "Something bad happened!")
            .with_exception(CapturedError::new("Oops").with_backtrace("   0: app::handler"));

        let record = pipeline.process(call);

        assert_eq!(record.get(TYPE), Some(&json!("error")));
        assert_eq!(record.get(LEVEL), Some(&json!("critical")));
        let trace = record.get(STACKTRACE).and_then(|v| v.as_str()).unwrap();
        assert!(trace.starts_with("Oops"));
        assert!(!record.contains_key(EXCEPTION));
        assert!(!record.data().unwrap().contains_key(EXCEPTION));
    }

    #[test]
    fn critical_with_exception_when_local() {
        let config = LoggingConfig::new("test");
        let (pipeline, _) = pipeline(config, Source::Application);
        let call = LogCall::new(Level::Critical, "Something bad happened!")
            .with_exception(CapturedError::new("Oops"));

        let record = pipeline.process(call);

        assert!(!record.contains_key(STACKTRACE));
        assert_eq!(record.data().unwrap().get(EXCEPTION), Some(&json!("Oops")));
        assert!(!record.contains_key(ENVIRONMENT));
    }

    #[test]
    fn root_fields_are_stamped() {
        let (pipeline, _) = pipeline(deployed("test"), Source::Dependency);
        let record = pipeline.process(LogCall::new(Level::Info, "ready").with_field("port", 8080));

        assert_eq!(record.get(COMPONENT), Some(&json!("test")));
        assert_eq!(record.get(ENVIRONMENT), Some(&json!("prod")));
        assert_eq!(record.get(SOURCE), Some(&json!("dependency")));
        assert_eq!(record.get(TYPE), Some(&json!("event")));
        assert_eq!(record.get(MESSAGE), Some(&json!("ready")));
        assert_eq!(record.data().unwrap().get("port"), Some(&json!(8080)));

        let timestamp = record.get(TIMESTAMP).and_then(|v| v.as_str()).unwrap();
        assert!(timestamp.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
        for key in record.entries().keys() {
            assert!(fields::is_root_field(key), "unexpected root key {key}");
        }
    }

    #[test]
    fn caller_cannot_set_root_fields() {
        let (pipeline, _) = pipeline(deployed("test"), Source::Application);
        let record = pipeline.process(
            LogCall::new(Level::Info, "m")
                .with_field(REQUEST_ID, "forged")
                .with_field(TIMESTAMP, "yesterday")
                .with_field(COMPONENT, "other"),
        );

        assert!(!record.contains_key(REQUEST_ID));
        assert_eq!(record.get(COMPONENT), Some(&json!("test")));
        assert_ne!(record.get(TIMESTAMP), Some(&json!("yesterday")));
        let data = record.data().unwrap();
        assert_eq!(data.get(REQUEST_ID), Some(&json!("forged")));
        assert_eq!(data.get(TIMESTAMP), Some(&json!("yesterday")));
        assert_eq!(data.get(COMPONENT), Some(&json!("other")));
    }

    #[test]
    fn request_id_comes_from_context() {
        let (pipeline, _) = pipeline(deployed("test"), Source::Application);

        let inside = context::run_with_request_id("request-123", || {
            pipeline.process(LogCall::new(Level::Info, "inside"))
        });
        let outside = pipeline.process(LogCall::new(Level::Info, "outside"));

        assert_eq!(inside.get(REQUEST_ID), Some(&json!("request-123")));
        assert!(!outside.contains_key(REQUEST_ID));
        assert!(!outside.data().unwrap().contains_key(REQUEST_ID));
    }

    #[test]
    fn location_is_added_and_original_file_kept() {
        let config = deployed("test").with_location(true);
        let (pipeline, _) = pipeline(config, Source::Application);
        let record = pipeline.process(
            LogCall::new(Level::Info, "m")
                .with_field(FILE, "upload.csv")
                .with_location("billing::import:42"),
        );

        let data = record.data().unwrap();
        assert_eq!(data.get(FILE), Some(&json!("billing::import:42")));
        assert_eq!(data.get(FILE_ORIGINAL), Some(&json!("upload.csv")));
    }

    #[test]
    fn error_prefix_only_touches_errors() {
        let config = deployed("test").with_error_message_prefix("[APM] ");
        let (pipeline, _) = pipeline(config, Source::Application);

        let warning = pipeline.process(LogCall::new(Level::Warning, "disk almost full"));
        let info = pipeline.process(LogCall::new(Level::Info, "started"));

        assert_eq!(warning.message(), Some("[APM] disk almost full"));
        assert_eq!(info.message(), Some("started"));
    }

    #[test]
    fn emit_respects_threshold_and_counts() {
        let config = deployed("test").with_log_level(Level::Warning);
        let (pipeline, sink) = pipeline(config, Source::Application);

        pipeline.emit(LogCall::new(Level::Info, "quiet"));
        pipeline.emit(LogCall::new(Level::Error, "loud"));

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.records()[0]["message"], "loud");
        assert_eq!(pipeline.stats().emitted.load(Ordering::Relaxed), 1);
        assert_eq!(pipeline.stats().suppressed.load(Ordering::Relaxed), 1);
    }

    struct FailingSink;

    impl LogSink for FailingSink {
        fn write_line(&self, _line: &str) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    #[test]
    fn write_failures_are_absorbed() {
        let pipeline = Pipeline::new(
            Arc::new(deployed("test")),
            Source::Application,
            Arc::new(JsonRenderer),
            Arc::new(FailingSink),
        );

        pipeline.emit(LogCall::new(Level::Error, "lost"));
        assert!(pipeline.try_emit(LogCall::new(Level::Error, "lost")).is_err());
        assert_eq!(pipeline.stats().failed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn unfiltered_emit_ignores_threshold() {
        let config = deployed("test").with_log_level(Level::Critical);
        let (pipeline, sink) = pipeline(config, Source::Application);

        pipeline.try_emit_unfiltered(LogCall::new(Level::Error, "must survive")).unwrap();

        assert_eq!(sink.records()[0]["message"], "must survive");
        assert_eq!(pipeline.stats().suppressed.load(Ordering::Relaxed), 0);
        assert_eq!(pipeline.stats().emitted.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn emitted_json_has_data_object() {
        let (pipeline, sink) = pipeline(deployed("test"), Source::Application);
        pipeline.emit(LogCall::new(Level::Debug, "m").with_field("k", "v"));

        // Debug is below the default Info threshold of a non-dev deployment.
        assert!(sink.is_empty());

        pipeline.emit(LogCall::new(Level::Info, "m").with_field("k", "v"));
        let record = &sink.records()[0];
        assert_eq!(record[DATA], json!({ "k": "v" }));
        assert_eq!(record["source"], "application");
    }
}
