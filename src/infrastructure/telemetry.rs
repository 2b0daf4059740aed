use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "mawaqit_scheduler=info";

/// Installs the global fmt subscriber. `RUST_LOG` overrides the default filter.
///
/// Returns `false` when a subscriber was already installed (tests, embedding hosts).
pub fn init_logging(verbose: bool) -> bool {
    let fallback = if verbose {
        "mawaqit_scheduler=debug"
    } else {
        DEFAULT_LOG_FILTER
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback.into()))
        .with_target(false)
        .try_init()
        .is_ok()
}
