// src/real_symbols.rs
//! Real-symbol table: the original libc implementations of every hook
//!
//! The shim shadows a fixed set of libc/resolver entry points. Whenever a
//! call is not routed through the overlay it must reach whatever
//! implementation would have run had the shim not been preloaded, which is
//! resolved with `dlsym(RTLD_NEXT, ...)`.
//!
//! The whole table is resolved in a single pass on first use and is
//! immutable afterward. Concurrent first callers block on the `OnceCell`
//! until the one resolution pass finishes, then all observe the same table.

use std::ffi::{c_char, c_int, c_void};
use std::mem;

use once_cell::sync::OnceCell;
use tracing::error;

use crate::interception::ares_hooks::{AresCallback, AresHostCallback};

pub type ConnectFn =
    unsafe extern "C" fn(c_int, *const libc::sockaddr, libc::socklen_t) -> c_int;
pub type BindFn = unsafe extern "C" fn(c_int, *const libc::sockaddr, libc::socklen_t) -> c_int;
pub type ListenFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
pub type AcceptFn =
    unsafe extern "C" fn(c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> c_int;
pub type Accept4Fn =
    unsafe extern "C" fn(c_int, *mut libc::sockaddr, *mut libc::socklen_t, c_int) -> c_int;
pub type GetaddrinfoFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *const libc::addrinfo,
    *mut *mut libc::addrinfo,
) -> c_int;
pub type GetnameinfoFn = unsafe extern "C" fn(
    *const libc::sockaddr,
    libc::socklen_t,
    *mut c_char,
    libc::socklen_t,
    *mut c_char,
    libc::socklen_t,
    c_int,
) -> c_int;
pub type GethostbyaddrFn =
    unsafe extern "C" fn(*const c_void, libc::socklen_t, c_int) -> *mut libc::hostent;
pub type GethostbyaddrRFn = unsafe extern "C" fn(
    *const c_void,
    libc::socklen_t,
    c_int,
    *mut libc::hostent,
    *mut c_char,
    libc::size_t,
    *mut *mut libc::hostent,
    *mut c_int,
) -> c_int;
pub type SetsockoptFn =
    unsafe extern "C" fn(c_int, c_int, c_int, *const c_void, libc::socklen_t) -> c_int;
pub type AresQueryFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, c_int, c_int, AresCallback, *mut c_void);
pub type AresGethostbynameFn =
    unsafe extern "C" fn(*mut c_void, *const c_char, c_int, AresHostCallback, *mut c_void);

/// Original implementations of the interposed entry points.
///
/// An absent entry means the process has no next definition of that symbol.
/// That is harmless until the fallback path actually needs it; see
/// [`require`].
pub struct RealSymbols {
    pub connect: Option<ConnectFn>,
    pub bind: Option<BindFn>,
    pub listen: Option<ListenFn>,
    pub accept: Option<AcceptFn>,
    pub accept4: Option<Accept4Fn>,
    pub getaddrinfo: Option<GetaddrinfoFn>,
    pub getnameinfo: Option<GetnameinfoFn>,
    pub gethostbyaddr: Option<GethostbyaddrFn>,
    pub gethostbyaddr_r: Option<GethostbyaddrRFn>,
    pub setsockopt: Option<SetsockoptFn>,
    pub ares_query: Option<AresQueryFn>,
    pub ares_gethostbyname: Option<AresGethostbynameFn>,
}

static TABLE: OnceCell<RealSymbols> = OnceCell::new();

impl RealSymbols {
    /// Return the process-wide table, resolving it on first use.
    pub fn get() -> &'static RealSymbols {
        TABLE.get_or_init(Self::resolve_all)
    }

    fn resolve_all() -> Self {
        // One pass over the whole covered set, not just the symbol that
        // triggered resolution.
        unsafe {
            Self {
                connect: resolve_next(b"connect\0"),
                bind: resolve_next(b"bind\0"),
                listen: resolve_next(b"listen\0"),
                accept: resolve_next(b"accept\0"),
                accept4: resolve_next(b"accept4\0"),
                getaddrinfo: resolve_next(b"getaddrinfo\0"),
                getnameinfo: resolve_next(b"getnameinfo\0"),
                gethostbyaddr: resolve_next(b"gethostbyaddr\0"),
                gethostbyaddr_r: resolve_next(b"gethostbyaddr_r\0"),
                setsockopt: resolve_next(b"setsockopt\0"),
                ares_query: resolve_next(b"ares_query\0"),
                ares_gethostbyname: resolve_next(b"ares_gethostbyname\0"),
            }
        }
    }
}

/// Look up the next definition of `symbol` in link order.
///
/// # Safety
///
/// `symbol` must be NUL-terminated and `T` must match the symbol's actual
/// function signature.
unsafe fn resolve_next<T: Copy>(symbol: &[u8]) -> Option<T> {
    debug_assert!(symbol.ends_with(&[0]));
    debug_assert_eq!(mem::size_of::<T>(), mem::size_of::<*mut c_void>());

    let ptr = libc::dlsym(libc::RTLD_NEXT, symbol.as_ptr().cast::<c_char>());
    if ptr.is_null() {
        None
    } else {
        Some(mem::transmute_copy(&ptr))
    }
}

/// Unwrap a table entry for an actual call.
///
/// An absent entry at invocation time means the host process has no real
/// implementation to fall back to. There is nothing sane to return to the
/// caller, so this aborts rather than unwinding into foreign frames.
pub fn require<T: Copy>(slot: Option<T>, name: &str) -> T {
    match slot {
        Some(f) => f,
        None => {
            error!(symbol = name, "no real implementation available for fallback");
            std::process::abort();
        }
    }
}
