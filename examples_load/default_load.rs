use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

use structured_log_pipeline::context;
use structured_log_pipeline::env::Environment;
use structured_log_pipeline::init::{init_logging_with_sink, LoggingConfig};
use structured_log_pipeline::noop_sink::NoopSink;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = LoggingConfig::new("load-test").with_environment(Environment::deployed("bench"));
    let handle = init_logging_with_sink(config, Arc::new(NoopSink))?;

    let tasks: u64 = 8;
    let per_task: u64 = 12_500;
    let start = Instant::now();

    let mut workers = Vec::new();
    for t in 0..tasks {
        workers.push(tokio::spawn(context::with_new_request_id(async move {
            for i in 0..per_task {
                error!(task = t, iteration = i, "default load test error");
            }
        })));
    }
    for worker in workers {
        worker.await?;
    }

    let elapsed = start.elapsed();
    let emitted = handle.application().stats().emitted.load(Ordering::Relaxed);
    println!("sent {} events in {:?} (~{:.0} ev/s)",
        emitted,
        elapsed,
        emitted as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
