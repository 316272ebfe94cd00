// src/interception/resolver_hooks.rs
//! Interposed `getaddrinfo`, `getnameinfo` and `gethostbyaddr[_r]`
//!
//! Forward resolution goes overlay-first and falls back to the real
//! resolver. Reverse resolution (`getnameinfo`) answers from the overlay's
//! address map when it can, otherwise passes through. The `gethostbyaddr`
//! pair has no overlay path at all and only exists so the calls are visible
//! in the shim's diagnostics.

use std::ffi::{c_char, c_int, c_void, CStr};

use tracing::debug;

use crate::interception::sockaddr;
use crate::overlay::OverlayLib;
use crate::real_symbols::{self, RealSymbols};
use crate::session::Session;

fn fmt_opt(ptr: *const c_char) -> String {
    if ptr.is_null() {
        "(null)".to_owned()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

#[no_mangle]
pub unsafe extern "C" fn getaddrinfo(
    name: *const c_char,
    service: *const c_char,
    hints: *const libc::addrinfo,
    res: *mut *mut libc::addrinfo,
) -> c_int {
    let overlay = OverlayLib::get();
    let real = || {
        real_symbols::require(RealSymbols::get().getaddrinfo, "getaddrinfo")(
            name, service, hints, res,
        )
    };

    // The overlay loop thread resolves the controller through this same
    // symbol while identities are still loading; it must never touch the
    // session barrier.
    if overlay.is_runtime_thread() {
        return real();
    }
    Session::get();
    debug!(name = %fmt_opt(name), service = %fmt_opt(service), "resolving");

    match overlay.resolve_addrinfo(name, service, hints, res) {
        Some(0) => 0,
        _ => real(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn getnameinfo(
    addr: *const libc::sockaddr,
    salen: libc::socklen_t,
    host: *mut c_char,
    hostlen: libc::socklen_t,
    serv: *mut c_char,
    servlen: libc::socklen_t,
    flags: c_int,
) -> c_int {
    let overlay = OverlayLib::get();
    let real = || {
        real_symbols::require(RealSymbols::get().getnameinfo, "getnameinfo")(
            addr, salen, host, hostlen, serv, servlen, flags,
        )
    };

    if overlay.is_runtime_thread() {
        return real();
    }
    Session::get();
    debug!("in getnameinfo");

    let Some((ip, port)) = sockaddr::dest_v4(addr) else {
        return real();
    };
    if ip.is_unspecified() {
        return real();
    }

    let Some(hostname) = overlay.lookup_hostname(ip) else {
        debug!(%ip, "no overlay mapping, fallback getnameinfo");
        return real();
    };

    sockaddr::write_truncated(host, hostlen as usize, hostname.as_bytes());
    sockaddr::write_truncated(serv, servlen as usize, port.to_string().as_bytes());
    0
}

#[no_mangle]
pub unsafe extern "C" fn gethostbyaddr(
    addr: *const c_void,
    len: libc::socklen_t,
    family: c_int,
) -> *mut libc::hostent {
    debug!(len, family, "gethostbyaddr");
    real_symbols::require(RealSymbols::get().gethostbyaddr, "gethostbyaddr")(addr, len, family)
}

#[no_mangle]
pub unsafe extern "C" fn gethostbyaddr_r(
    addr: *const c_void,
    len: libc::socklen_t,
    family: c_int,
    ret: *mut libc::hostent,
    buf: *mut c_char,
    buflen: libc::size_t,
    result: *mut *mut libc::hostent,
    h_errnop: *mut c_int,
) -> c_int {
    debug!(len, family, "gethostbyaddr_r");
    real_symbols::require(RealSymbols::get().gethostbyaddr_r, "gethostbyaddr_r")(
        addr, len, family, ret, buf, buflen, result, h_errnop,
    )
}

#[cfg(test)]
mod tests {
    use std::mem;
    use std::net::Ipv4Addr;
    use std::ptr;

    use super::*;

    #[test]
    fn test_getaddrinfo_falls_back_to_real_resolver() {
        // localhost resolves through the real getaddrinfo since no overlay
        // resolver is present in the test process.
        let mut res: *mut libc::addrinfo = ptr::null_mut();
        let rc = unsafe {
            getaddrinfo(
                b"localhost\0".as_ptr().cast(),
                ptr::null(),
                ptr::null(),
                &mut res,
            )
        };
        assert_eq!(rc, 0);
        assert!(!res.is_null());
        unsafe { libc::freeaddrinfo(res) };
    }

    #[test]
    fn test_getnameinfo_falls_back_without_overlay() {
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        sa.sin_family = libc::AF_INET as libc::sa_family_t;
        sa.sin_port = 80u16.to_be();
        sa.sin_addr.s_addr = u32::from_ne_bytes(Ipv4Addr::LOCALHOST.octets());

        let mut host = [0 as c_char; 64];
        let mut serv = [0 as c_char; 16];
        let rc = unsafe {
            getnameinfo(
                (&sa as *const libc::sockaddr_in).cast(),
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                host.as_mut_ptr(),
                host.len() as libc::socklen_t,
                serv.as_mut_ptr(),
                serv.len() as libc::socklen_t,
                libc::NI_NUMERICHOST | libc::NI_NUMERICSERV,
            )
        };
        assert_eq!(rc, 0);
        let host = unsafe { CStr::from_ptr(host.as_ptr()) };
        assert_eq!(host.to_bytes(), b"127.0.0.1");
    }
}
