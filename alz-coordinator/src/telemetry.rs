//! Tracing bootstrap.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_DIRECTIVE: &str = "alz_coordinator=info";

/// Target of events that need operator attention.
pub const ALERT_TARGET: &str = "alz::alert";

/// Install the global fmt subscriber, honouring `RUST_LOG` and falling back to
/// `default_directive`. Repeated calls are no-ops.
pub fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(DEFAULT_DIRECTIVE);
        init_tracing("debug");
        tracing::info!(target: ALERT_TARGET, "still alive");
    }
}
