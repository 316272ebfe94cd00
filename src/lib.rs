// src/lib.rs
//! ziti-shim: transparent overlay interception preload library
//!
//! Loaded ahead of libc (`LD_PRELOAD`), this library lets unmodified client
//! and server binaries participate in a zero-trust overlay network. It
//! interposes a small set of socket and name-resolution entry points and
//! decides, per call, whether to route through the overlay client library or
//! through the real OS implementation.
//!
//! # Architecture
//!
//! - **real_symbols**: lazily resolved originals of every interposed call
//! - **overlay**: boundary to the overlay client library (zitilib C ABI)
//! - **session**: one-time overlay runtime startup and identity loading
//! - **binding_table**: local port to hosted-service mapping (`ZITI_BINDINGS`)
//! - **fake_addr**: hostname/synthetic-address cache for legacy resolvers
//! - **interception**: the interposed entry points themselves
//! - **observability**: tracing setup (stderr, `ZITI_SHIM_LOG`)
//! - **utils**: configuration and error types

// Public module exports
pub mod binding_table;
pub mod fake_addr;
pub mod interception;
pub mod observability;
pub mod overlay;
pub mod real_symbols;
pub mod session;
pub mod utils;

// Re-export commonly used types
pub use binding_table::{Binding, BindingTable};
pub use fake_addr::{FakeAddrCache, FAKE_ADDR_BASE};
pub use overlay::{OverlayContext, OverlayLib};
pub use real_symbols::RealSymbols;
pub use session::Session;
pub use utils::errors::{Result, ShimError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
