use tracing_subscriber::EnvFilter;

/// `RUST_LOG` takes precedence; otherwise `info` when verbose and `warn` when not.
pub fn setup_logging(verbose: bool) {
    let fallback = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
