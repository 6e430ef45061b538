use std::error::Error;
use std::fmt;

use structured_log_pipeline::context;
use structured_log_pipeline::init::{init_logging, LoggingConfig};

/// Stand-in for a third-party crate that logs through the `log` facade.
mod some_library {
    pub fn connect(host: &str) {
        log::info!(host = host; "opening connection");
        log::warn!(host = host, retries = 3; "connection flaky");
    }
}

#[derive(Debug)]
struct ConfigMissing(&'static str);

impl fmt::Display for ConfigMissing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "missing config key {}", self.0)
    }
}

impl Error for ConfigMissing {}

fn main() -> Result<(), Box<dyn Error>> {
    let config = LoggingConfig::from_env("inventory")?.with_location(true);
    let handle = init_logging(config)?;

    context::run_with_new_request_id(|| {
        tracing::info!("application code logs with source=application");
        some_library::connect("db.internal");

        let err = ConfigMissing("DATABASE_URL");
        structured_log_pipeline::critical!(
            exception = &err as &(dyn Error + 'static),
            "cannot start"
        );
    });

    handle.flush();
    Ok(())
}
