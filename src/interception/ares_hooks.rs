// src/interception/ares_hooks.rs
//! Legacy resolver (c-ares ABI) adapter
//!
//! Some clients resolve through a callback-based DNS library instead of the
//! libc resolver. The shim may be loaded in place of that library, so these
//! two hooks implement its C ABI exactly. When a real implementation exists
//! further down the link order they delegate to it; when the shim is the
//! only definition, the "query" hook signals not-found so the caller's own
//! by-name fallback runs, and the "by name" hook answers with a synthetic
//! address from the fake-address cache so the hostname can be recovered at
//! connect time.
//!
//! Delegation can land back in these same symbols, so each hook holds a
//! per-thread "currently handling" marker. The markers are per hook: a real
//! by-name implementation issues queries internally, and those must still
//! reach the real query path. They are thread-local, not global: other
//! threads make genuine concurrent resolver calls without blocking on each
//! other.

use std::cell::Cell;
use std::ffi::{c_char, c_int, c_uchar, c_void, CStr, CString};
use std::net::Ipv4Addr;
use std::ptr;
use std::thread::LocalKey;

use tracing::debug;

use crate::fake_addr::FakeAddrCache;
use crate::real_symbols::RealSymbols;
use crate::utils::errors::{Result, ShimError};

pub const ARES_SUCCESS: c_int = 0;
pub const ARES_ENOTFOUND: c_int = 4;
pub const ARES_ENOMEM: c_int = 15;

/// Raw-answer callback used by the query entry point.
pub type AresCallback =
    unsafe extern "C" fn(arg: *mut c_void, status: c_int, timeouts: c_int, abuf: *mut c_uchar, alen: c_int);

/// Hostent callback used by the by-name entry point.
pub type AresHostCallback =
    unsafe extern "C" fn(arg: *mut c_void, status: c_int, timeouts: c_int, hostent: *mut libc::hostent);

thread_local! {
    static QUERY_HANDLING: Cell<bool> = const { Cell::new(false) };
    static HOST_HANDLING: Cell<bool> = const { Cell::new(false) };
}

/// Per-thread marker held while one resolver hook is handling a call.
///
/// `enter` fails when the current thread is already inside the same hook,
/// which is how a delegated call that loops back gets cut off. Each hook
/// owns its own marker so by-name delegation may still issue queries.
pub(crate) struct HookGuard(&'static LocalKey<Cell<bool>>);

impl HookGuard {
    pub(crate) fn enter(marker: &'static LocalKey<Cell<bool>>) -> Option<Self> {
        marker.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(HookGuard(marker))
            }
        })
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        self.0.with(|flag| flag.set(false));
    }
}

/// A minimal heap-backed `hostent` carrying exactly one IPv4 address.
///
/// Valid for the lifetime of the value; the record is released when it
/// drops, after the caller's callback has returned.
pub(crate) struct SynthHostent {
    _name: CString,
    _addr: Box<[u8; 4]>,
    _addr_list: Box<[*mut c_char; 2]>,
    _aliases: Box<[*mut c_char; 1]>,
    hostent: Box<libc::hostent>,
}

impl SynthHostent {
    pub(crate) fn new(host: &str, addr: Ipv4Addr) -> Result<Self> {
        let name =
            CString::new(host).map_err(|_| ShimError::BadHostname(host.to_owned()))?;
        let addr_bytes = Box::new(addr.octets());
        let addr_list = Box::new([addr_bytes.as_ptr() as *mut c_char, ptr::null_mut()]);
        let aliases = Box::new([ptr::null_mut::<c_char>()]);

        let hostent = Box::new(libc::hostent {
            h_name: name.as_ptr() as *mut c_char,
            h_aliases: aliases.as_ptr() as *mut *mut c_char,
            h_addrtype: libc::AF_INET,
            h_length: 4,
            h_addr_list: addr_list.as_ptr() as *mut *mut c_char,
        });

        Ok(Self {
            _name: name,
            _addr: addr_bytes,
            _addr_list: addr_list,
            _aliases: aliases,
            hostent,
        })
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::hostent {
        &mut *self.hostent
    }
}

#[no_mangle]
pub unsafe extern "C" fn ares_query(
    channel: *mut c_void,
    name: *const c_char,
    dnsclass: c_int,
    qtype: c_int,
    callback: AresCallback,
    arg: *mut c_void,
) {
    let Some(_guard) = HookGuard::enter(&QUERY_HANDLING) else {
        callback(arg, ARES_ENOTFOUND, 0, ptr::null_mut(), 0);
        return;
    };

    if let Some(real) = RealSymbols::get().ares_query {
        real(channel, name, dnsclass, qtype, callback, arg);
        return;
    }

    // No real query implementation: a uniform not-found sends the caller to
    // its own by-name fallback.
    debug!("ares_query with no next implementation, signaling not-found");
    callback(arg, ARES_ENOTFOUND, 0, ptr::null_mut(), 0);
}

#[no_mangle]
pub unsafe extern "C" fn ares_gethostbyname(
    channel: *mut c_void,
    name: *const c_char,
    family: c_int,
    callback: AresHostCallback,
    arg: *mut c_void,
) {
    let Some(_guard) = HookGuard::enter(&HOST_HANDLING) else {
        callback(arg, ARES_ENOTFOUND, 0, ptr::null_mut());
        return;
    };

    if let Some(real) = RealSymbols::get().ares_gethostbyname {
        real(channel, name, family, callback, arg);
        return;
    }

    if name.is_null() {
        callback(arg, ARES_ENOTFOUND, 0, ptr::null_mut());
        return;
    }

    let host = CStr::from_ptr(name).to_string_lossy().into_owned();
    let Some(addr) = FakeAddrCache::global().allocate_or_get(&host) else {
        callback(arg, ARES_ENOMEM, 0, ptr::null_mut());
        return;
    };
    debug!(host = %host, %addr, "answering by-name lookup with synthetic address");

    match SynthHostent::new(&host, addr) {
        Ok(mut record) => {
            callback(arg, ARES_SUCCESS, 0, record.as_mut_ptr());
            // record drops here, releasing the synthesized result.
        }
        Err(_) => callback(arg, ARES_ENOMEM, 0, ptr::null_mut()),
    }
}
