//! Turns an attached error into a readable trace.

use std::fmt::Write as _;

use crate::env::Environment;
use crate::fields::{EXCEPTION, STACKTRACE};
use crate::record::{CapturedError, EventRecord, PendingTrace};

/// Renders the error attached under `exception` and decides where the
/// result lands.
///
/// Deployed: a rendered trace is promoted to the `stacktrace` root field.
/// Local: the rendered trace stays under `exception` (so it ends up in
/// `data`). Anything that cannot be rendered goes back under `exception`
/// untouched.
#[derive(Debug, Clone)]
pub struct ExceptionNormalizer {
    promote_to_root: bool,
}

impl ExceptionNormalizer {
    pub fn new(environment: &Environment) -> Self {
        Self {
            promote_to_root: !environment.is_local(),
        }
    }

    pub fn normalize(&self, record: &mut EventRecord) {
        let Some(pending) = record.take_pending_trace() else {
            return;
        };

        match pending {
            PendingTrace::Captured(captured) => match render_trace(&captured) {
                Some(trace) if self.promote_to_root => {
                    record.insert(STACKTRACE, trace);
                }
                Some(trace) => {
                    record.insert(EXCEPTION, trace);
                }
                None => {
                    record.insert(EXCEPTION, captured.to_value());
                }
            },
            PendingTrace::Raw(value) => {
                record.insert(EXCEPTION, value);
            }
        }
    }
}

/// Format a captured error as message, cause chain and backtrace.
///
/// Returns `None` when there is nothing to show.
pub fn render_trace(captured: &CapturedError) -> Option<String> {
    let mut out = String::new();
    out.push_str(captured.message.trim_end());

    if !captured.sources.is_empty() {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str("Caused by:");
        for (i, source) in captured.sources.iter().enumerate() {
            let _ = write!(out, "\n    {i}: {source}");
        }
    }

    if let Some(backtrace) = captured.backtrace.as_deref().map(str::trim_end) {
        if !backtrace.is_empty() {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("Stack backtrace:\n");
            out.push_str(backtrace);
        }
    }

    if out.trim().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn with_error(error: CapturedError) -> EventRecord {
        EventRecord::new("Something bad happened!", Map::new(), Some(error))
    }

    #[test]
    fn renders_message_sources_and_backtrace() {
        let captured = CapturedError {
            message: "query failed".into(),
            sources: vec!["connection reset".into(), "broken pipe".into()],
            backtrace: Some("   0: app::main\n".into()),
        };

        let trace = render_trace(&captured).unwrap();
        assert_eq!(
            trace,
            "query failed\n\nCaused by:\n    0: connection reset\n    1: broken pipe\n\nStack backtrace:\n   0: app::main"
        );
    }

    #[test]
    fn empty_error_renders_nothing() {
        assert_eq!(render_trace(&CapturedError::new("  ")), None);
    }

    #[test]
    fn deployed_promotes_trace_to_root() {
        let mut record = with_error(CapturedError::new("Oops"));
        ExceptionNormalizer::new(&Environment::deployed("prod")).normalize(&mut record);

        assert_eq!(record.get(STACKTRACE), Some(&json!("Oops")));
        assert!(!record.contains_key(EXCEPTION));
        assert!(record.exception().is_none());
    }

    #[test]
    fn local_keeps_trace_free_form() {
        let mut record = with_error(CapturedError::new("Oops"));
        ExceptionNormalizer::new(&Environment::Local).normalize(&mut record);

        assert!(!record.contains_key(STACKTRACE));
        assert_eq!(record.get(EXCEPTION), Some(&json!("Oops")));
    }

    #[test]
    fn unrenderable_error_is_put_back() {
        let mut record = with_error(CapturedError::new(""));
        ExceptionNormalizer::new(&Environment::deployed("prod")).normalize(&mut record);

        assert!(!record.contains_key(STACKTRACE));
        assert_eq!(record.get(EXCEPTION), Some(&json!({ "message": "" })));
    }

    #[test]
    fn raw_values_pass_through() {
        let mut fields = Map::new();
        fields.insert(EXCEPTION.into(), json!({ "code": 7 }));
        let mut record = EventRecord::new("m", fields, None);
        ExceptionNormalizer::new(&Environment::deployed("prod")).normalize(&mut record);

        assert!(!record.contains_key(STACKTRACE));
        assert_eq!(record.get(EXCEPTION), Some(&json!({ "code": 7 })));
    }

    #[test]
    fn no_exception_is_a_no_op() {
        let mut record = EventRecord::new("m", Map::new(), None);
        let before = record.clone();
        ExceptionNormalizer::new(&Environment::deployed("prod")).normalize(&mut record);
        assert_eq!(record, before);
    }
}
