//! Panic hook behavior. The hook is process-wide, so everything runs in a
//! single test.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use structured_log_pipeline::env::Environment;
use structured_log_pipeline::fields::Source;
use structured_log_pipeline::init::LoggingConfig;
use structured_log_pipeline::panic::{install_panic_hook, PANIC_MESSAGE};
use structured_log_pipeline::pipeline::Pipeline;
use structured_log_pipeline::render::JsonRenderer;
use structured_log_pipeline::sink::{LogSink, MemorySink};
use structured_log_pipeline::Level;

struct ClosedSink;

impl LogSink for ClosedSink {
    fn write_line(&self, _line: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
}

fn flagging_hook() -> Arc<AtomicBool> {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    std::panic::set_hook(Box::new(move |_| flag.store(true, Ordering::SeqCst)));
    ran
}

fn pipeline(sink: Arc<dyn LogSink>) -> Arc<Pipeline> {
    // Threshold above the panic record's own level.
    let config = LoggingConfig::new("test")
        .with_environment(Environment::deployed("prod"))
        .with_log_level(Level::Critical);
    Arc::new(Pipeline::new(Arc::new(config), Source::Application, Arc::new(JsonRenderer), sink))
}

#[test]
fn panics_are_never_silent() {
    // Logged even though the threshold would suppress an error record.
    let previous_ran = flagging_hook();
    let sink = Arc::new(MemorySink::new());
    install_panic_hook(pipeline(sink.clone()));

    assert!(std::thread::spawn(|| panic!("worker exploded")).join().is_err());

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["message"], PANIC_MESSAGE);
    assert_eq!(records[0]["level"], "error");
    assert!(records[0]["stacktrace"].as_str().unwrap().contains("worker exploded"));
    assert!(!previous_ran.load(Ordering::SeqCst));

    // A record that cannot be written hands over to the previous hook.
    let previous_ran = flagging_hook();
    install_panic_hook(pipeline(Arc::new(ClosedSink)));

    assert!(std::thread::spawn(|| panic!("sink is gone")).join().is_err());

    assert!(previous_ran.load(Ordering::SeqCst));

    let _ = std::panic::take_hook();
}
