use tracing_subscriber::{fmt, EnvFilter};

/// Initializes tracing on stderr; stdout is reserved for JSON-RPC frames.
///
/// Defaults to `info` for this crate and `warn` elsewhere. `RUST_LOG`
/// overrides the filter.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,meta_ads_tools=info"));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}
