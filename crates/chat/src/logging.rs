use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}
