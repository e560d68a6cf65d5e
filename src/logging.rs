use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` wins over the verbosity flag.
/// Safe to call more than once; later calls are ignored.
pub fn init(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("visionarm={}", log_level)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
