use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

static GUARD: OnceCell<()> = OnceCell::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`. Safe to call from
/// every test; only the first call installs.
pub fn enable_tracing_by_env() {
    GUARD.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });
}
