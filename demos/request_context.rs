use std::time::Duration;
use tracing::{info, warn};

use structured_log_pipeline::context;
use structured_log_pipeline::init::init_logging_from_env;

async fn charge(invoice: u32) {
    info!(invoice, "charging card");
    tokio::time::sleep(Duration::from_millis(10)).await;
    if invoice % 2 == 0 {
        warn!(invoice, "card declined, retrying later");
    }
}

/// Run with and without `ENV=prod` to compare console and JSON output.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _logging = init_logging_from_env("billing")?;

    info!("starting service");

    let mut requests = Vec::new();
    for invoice in 1..=4 {
        requests.push(tokio::spawn(context::with_new_request_id(async move {
            charge(invoice).await;
            // Background work started from the request keeps its id.
            tokio::spawn(context::in_current_context(async move {
                info!(invoice, "receipt queued");
            }))
            .await
        })));
    }
    for request in requests {
        request.await??;
    }

    info!("shutting down");
    Ok(())
}
