// src/interception/mod.rs
//! Interposed entry points
//!
//! The exported `#[no_mangle]` functions in this module shadow their libc
//! and legacy-resolver counterparts when the shim is preloaded. Each hook
//! decides, per call, whether to route through the overlay or through the
//! real implementation from the real-symbol table:
//!
//! ```text
//! Host process (unmodified)
//!     │
//!     ├─ connect/setsockopt ──► connect_hooks ──► overlay or real libc
//!     ├─ bind/listen/accept ──► bind_hooks ─────► binding table + overlay
//!     ├─ getaddrinfo/... ─────► resolver_hooks ─► overlay resolver or real
//!     └─ ares_query/... ──────► ares_hooks ─────► delegate or synthesize
//! ```
//!
//! Every fallback preserves the exact POSIX contract of the function being
//! shadowed; a caller can never tell which path served it.

pub mod ares_hooks;
pub mod bind_hooks;
pub mod connect_hooks;
pub mod resolver_hooks;
pub mod sockaddr;

// Re-export commonly used types
pub use ares_hooks::{ARES_ENOMEM, ARES_ENOTFOUND, ARES_SUCCESS};
pub use bind_hooks::normalize_bind_rc;
pub use connect_hooks::{route_connect, ConnectRoute};
