//! Tracing subscriber setup
//!
//! The library never installs a global subscriber on its own; binaries and
//! demos call [`init_tracing`] once at startup. Individual managers can be
//! pointed at their own dispatcher with `Manager::with_dispatch`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is not set
const DEFAULT_FILTER: &str = "info,cgvisor=debug";

/// Install the global tracing subscriber
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
///
/// # Example
/// ```ignore
/// cgvisor::tracing::init_tracing(false)?;
/// ```
pub fn init_tracing(json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()?;
    }

    tracing::info!(json, "tracing initialized");
    Ok(())
}
