use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::dependency::DependencyLogger;
use crate::env::{self, Environment, LOG_LEVEL_ENV};
use crate::error::{ConfigError, InitError};
use crate::fields::Source;
use crate::layer::StructuredLayer;
use crate::level::Level;
use crate::panic::install_panic_hook;
use crate::pipeline::Pipeline;
use crate::render::{renderer_for, Renderer};
use crate::sink::{LogSink, StdoutSink};

/// Process-wide logging configuration.
///
/// Built once at startup and shared read-only by both pipelines.
///
/// **Fields**
/// - `component`: stamped into every record as `component`.
/// - `log_level`: explicit threshold. When `None`, see [`LoggingConfig::threshold`].
/// - `environment`: selects the renderer and where traces go.
/// - `include_location`: adds the static call site as `file` (under `data`).
/// - `error_message_prefix`: prepended to the message of error-type records,
///   for log scrapers that key on it.
#[derive(Clone, Debug, Default)]
pub struct LoggingConfig {
    pub component: Option<String>,
    pub log_level: Option<Level>,
    pub environment: Environment,
    pub include_location: bool,
    pub error_message_prefix: Option<String>,
}

impl LoggingConfig {
    /// Local environment, default threshold.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: Some(component.into()),
            ..Self::default()
        }
    }

    /// Resolve `ENV` and `LOG_LEVEL` from the process environment.
    ///
    /// **Errors**
    /// - [`ConfigError::InvalidLevel`] if `LOG_LEVEL` is set to an unknown level.
    pub fn from_env(component: impl Into<String>) -> Result<Self, ConfigError> {
        let log_level = env::env_opt(LOG_LEVEL_ENV).map(|s| s.parse()).transpose()?;
        Ok(Self {
            log_level,
            environment: Environment::from_env(),
            ..Self::new(component)
        })
    }

    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_location(mut self, include_location: bool) -> Self {
        self.include_location = include_location;
        self
    }

    pub fn with_error_message_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.error_message_prefix = Some(prefix.into());
        self
    }

    /// Explicit level first, then `Debug` for the `dev` environment, then `Info`.
    pub fn threshold(&self) -> Level {
        match self.log_level {
            Some(level) => level,
            None if self.environment.is_dev() => Level::Debug,
            None => Level::Info,
        }
    }
}

/// The two pipelines of a process, one per [`Source`].
#[derive(Clone)]
pub struct LoggingHandle {
    application: Arc<Pipeline>,
    dependency: Arc<Pipeline>,
}

impl LoggingHandle {
    /// Build both pipelines without installing anything globally.
    pub fn new(config: LoggingConfig, renderer: Arc<dyn Renderer>, sink: Arc<dyn LogSink>) -> Self {
        let config = Arc::new(config);
        let application = Pipeline::new(
            Arc::clone(&config),
            Source::Application,
            Arc::clone(&renderer),
            Arc::clone(&sink),
        );
        let dependency = Pipeline::new(config, Source::Dependency, renderer, sink);

        Self {
            application: Arc::new(application),
            dependency: Arc::new(dependency),
        }
    }

    pub fn application(&self) -> &Arc<Pipeline> {
        &self.application
    }

    pub fn dependency(&self) -> &Arc<Pipeline> {
        &self.dependency
    }

    /// `tracing` layer feeding the application pipeline.
    pub fn layer(&self) -> StructuredLayer {
        StructuredLayer::new(Arc::clone(&self.application))
    }

    /// `log` logger feeding the dependency pipeline.
    pub fn dependency_logger(&self) -> DependencyLogger {
        DependencyLogger::new(Arc::clone(&self.dependency))
    }

    pub fn flush(&self) {
        self.application.flush();
        self.dependency.flush();
    }
}

/// Initialize process-wide logging, writing to stdout.
///
/// Equivalent to [`init_logging_with_sink`] with [`StdoutSink`]. This is
/// the recommended entrypoint for typical services; call it once at
/// startup, before spawning any work.
pub fn init_logging(config: LoggingConfig) -> Result<LoggingHandle, InitError> {
    init_logging_with_sink(config, Arc::new(StdoutSink))
}

/// [`init_logging`] with [`LoggingConfig::from_env`].
pub fn init_logging_from_env(component: impl Into<String>) -> Result<LoggingHandle, InitError> {
    init_logging(LoggingConfig::from_env(component)?)
}

/// Initialize process-wide logging with the provided sink.
///
/// **Effects**
/// - installs a [`Registry`] with [`StructuredLayer`] as the global
///   `tracing` subscriber (application channel);
/// - installs [`DependencyLogger`] as the global `log` logger
///   (dependency channel);
/// - replaces the panic hook so each panic is logged once.
///
/// **Errors**
/// - [`InitError::Subscriber`] / [`InitError::Logger`] if another subscriber
///   or logger was installed first.
pub fn init_logging_with_sink(config: LoggingConfig, sink: Arc<dyn LogSink>) -> Result<LoggingHandle, InitError> {
    let renderer = renderer_for(&config.environment);
    let threshold = config.threshold();
    let handle = LoggingHandle::new(config, renderer, sink);

    let subscriber = Registry::default().with(handle.layer());
    tracing::subscriber::set_global_default(subscriber)?;

    log::set_boxed_logger(Box::new(handle.dependency_logger()))?;
    log::set_max_level(threshold.to_log_filter());

    install_panic_hook(Arc::clone(&handle.application));
    Ok(handle)
}
