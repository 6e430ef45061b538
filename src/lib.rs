//! Structured event logging with a fixed root schema.
//!
//! Every log call, whether it comes from application code through `tracing`
//! or from a library through `log`, is turned into a record whose top level
//! only ever holds `level`, `message`, `data`, `environment`, `source`,
//! `type`, `component`, `stacktrace`, `requestId` and `timestamp`. All other
//! fields are nested under `data`.
//!
//! ```no_run
//! use structured_log_pipeline::{context, init::{init_logging, LoggingConfig}};
//!
//! # async fn handle() {}
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let _logging = init_logging(LoggingConfig::from_env("billing")?)?;
//!
//! context::with_new_request_id(async {
//!     tracing::info!(invoice = 42, "invoice sent");
//!     handle().await;
//! })
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod dependency;
pub mod env;
pub mod error;
pub mod exception;
pub mod fields;
pub mod init;
pub mod layer;
pub mod level;
pub mod noop_sink;
pub mod panic;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod sink;

pub use level::Level;
pub use record::{CapturedError, EventRecord, LogCall};

#[doc(hidden)]
pub mod __private {
    pub use tracing;
}

/// Emit a `tracing` event at [`Level::Critical`].
///
/// Accepts the same arguments as `tracing::error!` (without `target:` or
/// `parent:`).
///
/// ```no_run
/// structured_log_pipeline::critical!(shard = 3, "replication stopped");
/// ```
#[macro_export]
macro_rules! critical {
    ($($arg:tt)+) => {
        $crate::__private::tracing::error!(critical = true, $($arg)+)
    };
}
