//! Severity levels carried by every [`EventRecord`](crate::record::EventRecord).
//!
//! The pipeline speaks five levels. `tracing` and `log` both stop at
//! `ERROR`, so [`Level::Critical`] is only reachable through the
//! [`critical!`](crate::critical) macro or by building a
//! [`LogCall`](crate::record::LogCall) directly.

use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Canonical log level, ordered by severity (ascending) so thresholds can be
/// checked with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warning,
        Level::Error,
        Level::Critical,
    ];

    /// Wire name of the level, as it appears in the `level` root field.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
            Level::Critical => "critical",
        }
    }

    /// Map a `tracing` level. `TRACE` folds into [`Level::Debug`].
    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }

    /// Map a `log` facade level. `Trace` folds into [`Level::Debug`].
    pub fn from_log(level: log::Level) -> Self {
        match level {
            log::Level::Trace | log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warning,
            log::Level::Error => Level::Error,
        }
    }

    /// Most verbose `log` filter that still lets this level through.
    pub fn to_log_filter(self) -> log::LevelFilter {
        match self {
            Level::Debug => log::LevelFilter::Trace,
            Level::Info => log::LevelFilter::Info,
            Level::Warning => log::LevelFilter::Warn,
            Level::Error | Level::Critical => log::LevelFilter::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ConfigError;

    /// Case-insensitive, with the usual aliases (`warn`, `err`, `fatal`, `trace`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warning),
            "err" | "error" => Ok(Level::Error),
            "critical" | "fatal" => Ok(Level::Critical),
            _ => Err(ConfigError::InvalidLevel(s.to_string())),
        }
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
