//! Logging of panics.
//!
//! A panic hook runs before unwinding starts, so it cannot tell whether the
//! panic will later be caught by `catch_unwind` or surface through a
//! `JoinHandle`. The record therefore only states that a panic occurred.

use std::backtrace::Backtrace;
use std::panic::{self, PanicHookInfo};
use std::sync::Arc;

use crate::level::Level;
use crate::pipeline::Pipeline;
use crate::record::{CapturedError, LogCall};

pub const PANIC_MESSAGE: &str = "A panic occurred";

/// Replace the process panic hook with one that logs the panic as a single
/// error record through `pipeline`.
///
/// The record bypasses the log level threshold. If it cannot be written,
/// the previously installed hook runs instead so the panic is never silent.
/// Unwinding (or aborting) continues as usual afterwards.
pub fn install_panic_hook(pipeline: Arc<Pipeline>) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        if let Err(e) = pipeline.try_emit_unfiltered(panic_call(info)) {
            eprintln!("failed to log panic: {}", e);
            previous(info);
        }
    }));
}

/// Build the log call describing a panic.
pub fn panic_call(info: &PanicHookInfo<'_>) -> LogCall {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Box<dyn Any>".to_string());

    let message = match info.location() {
        Some(location) => format!("panicked at {}: {}", location, payload),
        None => format!("panicked: {}", payload),
    };
    let exception = CapturedError::new(message).with_backtrace(Backtrace::force_capture().to_string());

    let mut call = LogCall::new(Level::Error, PANIC_MESSAGE).with_exception(exception);
    if let Some(name) = std::thread::current().name() {
        call = call.with_field("thread", name);
    }
    call
}
