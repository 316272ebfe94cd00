// src/overlay.rs
//! Boundary to the overlay-network client library
//!
//! The overlay client (zitilib C ABI) owns connection establishment,
//! identity/session management, and transport. This module only declares the
//! entry points the dispatch layer consumes and wraps them so the rest of
//! the crate never touches raw symbols.
//!
//! Symbols are resolved dynamically (`dlsym(RTLD_DEFAULT)`) instead of being
//! linked: the overlay library may arrive in the process as a second preload
//! object or a plain dependency, and when it is absent entirely every
//! wrapper reports non-applicability so the dispatch degrades to a
//! transparent pass-through.

use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::mem;
use std::net::Ipv4Addr;
use std::ptr;

use once_cell::sync::OnceCell;
use tracing::debug;

/// Opaque handle to a loaded overlay identity context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OverlayContext(*mut c_void);

// The context handle is an opaque token owned by the overlay library; it is
// valid from any thread for the life of the process.
unsafe impl Send for OverlayContext {}
unsafe impl Sync for OverlayContext {}

type LibInitFn = unsafe extern "C" fn();
type LoadContextFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
type LibThreadFn = unsafe extern "C" fn() -> libc::pthread_t;
type ConnectAddrFn = unsafe extern "C" fn(c_int, *const c_char, c_uint) -> c_int;
type BindFn = unsafe extern "C" fn(c_int, *mut c_void, *const c_char, *const c_char) -> c_int;
type ListenFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
type AcceptFn = unsafe extern "C" fn(c_int, *mut c_char, c_int) -> c_int;
type LookupFn = unsafe extern "C" fn(u32) -> *const c_char;
type ResolveFn = unsafe extern "C" fn(
    *const c_char,
    *const c_char,
    *const libc::addrinfo,
    *mut *mut libc::addrinfo,
) -> c_int;
type CheckSocketFn = unsafe extern "C" fn(c_int) -> c_int;
type LastErrorFn = unsafe extern "C" fn() -> c_int;

/// Resolved overlay entry points.
pub struct OverlayLib {
    lib_init: Option<LibInitFn>,
    load_context: Option<LoadContextFn>,
    lib_thread: Option<LibThreadFn>,
    connect_addr: Option<ConnectAddrFn>,
    bind: Option<BindFn>,
    listen: Option<ListenFn>,
    accept: Option<AcceptFn>,
    lookup: Option<LookupFn>,
    resolve: Option<ResolveFn>,
    check_socket: Option<CheckSocketFn>,
    last_error: Option<LastErrorFn>,
}

static LIB: OnceCell<OverlayLib> = OnceCell::new();

impl OverlayLib {
    /// Return the process-wide overlay symbol set, resolving it on first use.
    pub fn get() -> &'static OverlayLib {
        LIB.get_or_init(|| {
            let lib = unsafe {
                OverlayLib {
                    lib_init: resolve(b"Ziti_lib_init\0"),
                    load_context: resolve(b"Ziti_load_context\0"),
                    lib_thread: resolve(b"Ziti_lib_thread\0"),
                    connect_addr: resolve(b"Ziti_connect_addr\0"),
                    bind: resolve(b"Ziti_bind\0"),
                    listen: resolve(b"Ziti_listen\0"),
                    accept: resolve(b"Ziti_accept\0"),
                    lookup: resolve(b"Ziti_lookup\0"),
                    resolve: resolve(b"Ziti_resolve\0"),
                    check_socket: resolve(b"Ziti_check_socket\0"),
                    last_error: resolve(b"Ziti_last_error\0"),
                }
            };
            if !lib.available() {
                debug!("overlay client library not present, all calls pass through");
            }
            lib
        })
    }

    /// Whether an overlay client library is loaded in this process.
    pub fn available(&self) -> bool {
        self.lib_init.is_some()
    }

    /// One-time overlay runtime startup. Safe to call repeatedly; the
    /// overlay library guards its own initialization.
    pub fn init_runtime(&self) -> bool {
        match self.lib_init {
            Some(f) => {
                unsafe { f() };
                true
            }
            None => false,
        }
    }

    /// Load one identity by locator, returning its context on success.
    pub fn load_identity(&self, locator: &CStr) -> Option<OverlayContext> {
        let f = self.load_context?;
        let ctx = unsafe { f(locator.as_ptr()) };
        if ctx.is_null() {
            None
        } else {
            Some(OverlayContext(ctx))
        }
    }

    /// True when the calling thread is the overlay runtime's internal loop
    /// thread. Overlay-originated traffic must never recurse into the shim.
    pub fn is_runtime_thread(&self) -> bool {
        match self.lib_thread {
            Some(f) => unsafe { f() == libc::pthread_self() },
            None => false,
        }
    }

    /// Overlay's own address-to-hostname map.
    pub fn lookup_hostname(&self, addr: Ipv4Addr) -> Option<String> {
        let f = self.lookup?;
        let s_addr = u32::from_ne_bytes(addr.octets());
        let name = unsafe { f(s_addr) };
        if name.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned())
        }
    }

    /// Connect `fd` to an overlay service by hostname and port.
    /// Returns `None` when no overlay connect entry point exists.
    pub fn connect_by_name(&self, fd: c_int, host: &CStr, port: u16) -> Option<c_int> {
        let f = self.connect_addr?;
        Some(unsafe { f(fd, host.as_ptr(), c_uint::from(port)) })
    }

    /// Bind `fd` to a hosted service under `ctx`, optionally at a named
    /// terminator.
    pub fn bind_service(
        &self,
        fd: c_int,
        ctx: OverlayContext,
        service: &CStr,
        terminator: Option<&CStr>,
    ) -> Option<c_int> {
        let f = self.bind?;
        let term = terminator.map_or(ptr::null(), CStr::as_ptr);
        Some(unsafe { f(fd, ctx.0, service.as_ptr(), term) })
    }

    pub fn listen(&self, fd: c_int, backlog: c_int) -> Option<c_int> {
        let f = self.listen?;
        Some(unsafe { f(fd, backlog) })
    }

    /// Accept an overlay client on a bound socket. On success the caller
    /// identity is written (NUL-terminated) into `caller`.
    pub fn accept(&self, fd: c_int, caller: &mut [c_char]) -> Option<c_int> {
        let f = self.accept?;
        Some(unsafe { f(fd, caller.as_mut_ptr(), caller.len() as c_int) })
    }

    /// Overlay-side host/service/hints resolution with getaddrinfo
    /// semantics. `None` means no overlay resolver is present.
    ///
    /// # Safety
    ///
    /// Arguments must satisfy the getaddrinfo contract.
    pub unsafe fn resolve_addrinfo(
        &self,
        name: *const c_char,
        service: *const c_char,
        hints: *const libc::addrinfo,
        res: *mut *mut libc::addrinfo,
    ) -> Option<c_int> {
        let f = self.resolve?;
        Some(f(name, service, hints, res))
    }

    /// Whether `fd` is managed by the overlay library.
    pub fn is_overlay_socket(&self, fd: c_int) -> bool {
        match self.check_socket {
            Some(f) => unsafe { f(fd) != 0 },
            None => false,
        }
    }

    /// The overlay's most recent error code for this thread.
    pub fn last_error(&self) -> c_int {
        match self.last_error {
            Some(f) => unsafe { f() },
            None => 0,
        }
    }
}

/// Look up `symbol` anywhere in the process's global scope.
///
/// # Safety
///
/// `symbol` must be NUL-terminated and `T` must match the symbol's actual
/// function signature.
unsafe fn resolve<T: Copy>(symbol: &[u8]) -> Option<T> {
    debug_assert!(symbol.ends_with(&[0]));
    debug_assert_eq!(mem::size_of::<T>(), mem::size_of::<*mut c_void>());

    let ptr = libc::dlsym(libc::RTLD_DEFAULT, symbol.as_ptr().cast::<c_char>());
    if ptr.is_null() {
        None
    } else {
        Some(mem::transmute_copy(&ptr))
    }
}
