// src/observability.rs
//! Tracing initialization for the preload shim
//!
//! Logging goes to stderr: stdout belongs to the host process and must not
//! be polluted by a library it never asked for. The filter is driven by
//! `ZITI_SHIM_LOG` and defaults to `warn` so an uninstrumented process stays
//! quiet unless something is actually wrong.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

use crate::utils::config::LOG_VAR;

static INIT: Once = Once::new();

/// Initialize the global tracing subscriber exactly once.
///
/// Safe to call from any hook at any time; the host process may have its own
/// Rust subscriber installed already, in which case `try_init` loses the race
/// and logging stays with the host.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
