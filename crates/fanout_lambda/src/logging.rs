//! JSON logging for the Lambda runtime. CloudWatch picks up stdout, so there
//! is no file layer. Verbosity follows `RUST_LOG` (default: `info`).

use tracing_subscriber::EnvFilter;

pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_current_span(false)
        .with_target(false)
        .without_time()
        .try_init();
}
