//! Error types for configuration, initialization and rendering.
//!
//! None of these ever escape from a log call: the pipeline absorbs
//! rendering failures itself. They surface only from setup functions.

/// Error returned when building a [`LoggingConfig`](crate::init::LoggingConfig).
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("unknown log level: {0:?}")]
    InvalidLevel(String),
}

/// Error returned when installing the process-wide logging hooks.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("a global tracing subscriber is already installed")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("a global `log` logger is already installed")]
    Logger(#[from] log::SetLoggerError),
}

/// Error returned by a [`Renderer`](crate::render::Renderer).
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to format record: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Error returned by [`Pipeline::try_emit`](crate::pipeline::Pipeline::try_emit).
#[derive(thiserror::Error, Debug)]
pub enum EmitError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("failed to write record: {0}")]
    Write(#[from] std::io::Error),
}
