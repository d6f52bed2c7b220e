//! Telemetry helpers for structured logging and tracing.

/// Install a default env-filter subscriber if none is set yet.
///
/// Honors `RUST_LOG`. Embedders that install their own subscriber before
/// constructing any scheduler component are left alone; repeated calls are
/// no-ops.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
