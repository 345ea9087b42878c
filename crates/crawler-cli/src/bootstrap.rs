use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Compact formatter, no target in output, `WARN` default overridable via
/// `RUST_LOG`.
pub(crate) fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
