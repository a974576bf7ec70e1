use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install a pretty stdout subscriber, used by tests.
///
/// Installing twice is a no-op, so every test can call it.
pub fn install_fmt_log() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty().with_test_writer();
    let _ = Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with(stdout_log)
        .try_init();
}

/// Initialize logging to stderr.
///
/// The level comes from `RUST_LOG` when it is set, otherwise from
/// `default_log_level`.
pub fn init_log(default_log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
    tracing::debug!("logging started");
}
