use tracing_subscriber::EnvFilter;

/// Default filter for `level`. `RUST_LOG` still wins when set.
pub fn default_directives(level: &str) -> String {
    let level = level.trim();
    let level = if level.is_empty() { "info" } else { level };
    format!("warn,noscroll={level},reqwest=warn")
}

/// Installs the stderr subscriber. Later calls are ignored.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .try_init();
}
