use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. Idempotent: a second call is a no-op
/// so tests and embedders can both call it.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
