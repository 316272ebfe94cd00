// src/utils/config.rs
//! Process configuration read from the environment
//!
//! The shim is configured entirely through environment variables, read once
//! when the overlay session is first initialized:
//!
//! - `ZITI_IDENTITIES`: `;`-separated identity configuration locators
//! - `ZITI_BINDINGS`: `;`-separated `port:[terminator@]service` entries
//! - `ZITI_SHIM_LOG`: tracing filter directive (defaults to `warn`)

use std::env;

/// Environment variable naming the overlay identities to load.
pub const IDENTITIES_VAR: &str = "ZITI_IDENTITIES";

/// Environment variable holding the service binding specification.
pub const BINDINGS_VAR: &str = "ZITI_BINDINGS";

/// Environment variable selecting the log filter.
pub const LOG_VAR: &str = "ZITI_SHIM_LOG";

/// Snapshot of the shim's environment configuration
#[derive(Debug, Clone, Default)]
pub struct ShimConfig {
    /// Identity locators, in the order they appear in the environment
    pub identities: Vec<String>,

    /// Raw binding specification, if any
    pub bindings: Option<String>,
}

impl ShimConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        let identities = env::var(IDENTITIES_VAR)
            .map(|v| split_list(&v))
            .unwrap_or_default();

        Self {
            identities,
            bindings: env::var(BINDINGS_VAR).ok(),
        }
    }
}

/// Split a `;`-separated list, dropping empty segments.
///
/// A trailing `;` (common in hand-written environment values) produces no
/// phantom entry.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}
