// src/utils/errors.rs
//! Error types for the interception layer
//!
//! These cover the Rust-side seams only (configuration parsing, record
//! synthesis). The interposed C entry points report failures through POSIX
//! return codes and errno, never by unwinding.

use thiserror::Error;

/// Result type alias used throughout the shim
pub type Result<T> = std::result::Result<T, ShimError>;

#[derive(Error, Debug)]
pub enum ShimError {
    /// Malformed binding entry in ZITI_BINDINGS
    #[error("invalid binding specification '{0}', expecting 'port:[terminator@]service'")]
    InvalidBinding(String),

    /// Port outside the 16-bit range
    #[error("invalid port in binding specification '{0}', expecting 0..65535")]
    InvalidPort(String),

    /// Hostname cannot be carried across the C boundary (embedded NUL, etc.)
    #[error("hostname '{0}' cannot be represented as a C string")]
    BadHostname(String),
}
