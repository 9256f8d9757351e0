//! Structured JSON logging setup using tracing.
//!
//! Registry calls carry a `registry` span field (`managed_device`,
//! `provisioning`, `directory`) so a deletion can be followed across stages
//! by filtering on it.

use tracing_subscriber::filter::ParseError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with JSON logging.
///
/// `RUST_LOG` wins when set; otherwise `filter` is used.
pub fn init_logging(filter: &str) {
    let from_env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter_layer = match env_filter(from_env.as_deref(), filter) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("FATAL: Failed to create log filter: {e}");
            std::process::exit(1);
        }
    };

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter_layer)
        .init();

    tracing::info!(filter = %filter, "Logging initialized");
}

/// Picks the environment directive when it parses, else the configured one.
fn env_filter(from_env: Option<&str>, fallback: &str) -> Result<EnvFilter, ParseError> {
    if let Some(directive) = from_env {
        match EnvFilter::try_new(directive) {
            Ok(filter) => return Ok(filter),
            Err(e) => eprintln!("Ignoring invalid RUST_LOG {directive:?}: {e}"),
        }
    }
    EnvFilter::try_new(fallback)
}
