use tokio::sync::RwLock;
use tracing::trace;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Used when `RUST_LOG` is unset. The gateway's own spans carry the
/// per-connection story at debug level; third-party crates stay quiet.
const DEFAULT_DIRECTIVES: &str = "info,serial_gate=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_DIRECTIVES.into()))
}

#[cfg(not(feature = "use-tracy"))]
fn do_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter()))
        .init();
}

#[cfg(feature = "use-tracy")]
fn do_init() {
    use tracing::metadata::LevelFilter;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter()))
        .with(tracing_tracy::TracyLayer::new().with_filter(LevelFilter::DEBUG))
        .init();
}

/// Initialize tracing.
///
/// Will only initialize once, so tests may call this.
pub async fn init() {
    static TRACING_IS_INITIALIZED: RwLock<bool> = RwLock::const_new(false);

    let initialized = { *TRACING_IS_INITIALIZED.read().await };

    if !initialized {
        let mut initialized = TRACING_IS_INITIALIZED.write().await;

        // To avoid race condition between the `.read()` and the
        // `.write()`.
        if *initialized {
            return;
        }

        do_init();

        *initialized = true;
    }
}

/// Flush anything not logged yet.
pub fn shutdown() {
    trace!("Shutting down");
}
