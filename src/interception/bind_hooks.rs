// src/interception/bind_hooks.rs
//! Interposed `bind`, `listen`, `accept` and `accept4`
//!
//! The inbound half of the dispatch. `bind` consults the per-port binding
//! table: a configured port becomes an overlay service host, anything else
//! stays a plain OS bind. `listen` and the accepts are overlay-first with
//! silent fallback, and an accepted overlay client is reported to the caller
//! with a synthesized `AF_UNIX` peer address carrying its identity.

use std::ffi::{c_char, c_int, CStr, CString};

use tracing::{debug, warn};

use crate::binding_table::BindingTable;
use crate::interception::sockaddr;
use crate::overlay::OverlayLib;
use crate::real_symbols::{self, RealSymbols};
use crate::session::Session;

/// Caller-identity scratch size, matching the overlay accept contract.
const CALLER_BUF_LEN: usize = 128;

/// Collapse an overlay bind return code and the accompanying last-error
/// into the value reported to the caller.
///
/// A failing code whose error is `EALREADY` means the descriptor already
/// hosts the service; re-binding it is idempotent and reports success.
pub fn normalize_bind_rc(rc: c_int, err: c_int) -> c_int {
    if rc != 0 && err == libc::EALREADY {
        return 0;
    }
    rc
}

#[no_mangle]
pub unsafe extern "C" fn bind(
    fd: c_int,
    addr: *const libc::sockaddr,
    len: libc::socklen_t,
) -> c_int {
    let session = Session::get();
    debug!(fd, "in bind");

    let Some(port) = sockaddr::bind_port(addr) else {
        // Unsupported address family: invalid argument, no fallback.
        *libc::__errno_location() = libc::EINVAL;
        return -1;
    };

    let table = BindingTable::global();
    let Some(binding) = table.lookup(port) else {
        return real_symbols::require(RealSymbols::get().bind, "bind")(fd, addr, len);
    };

    debug!(
        port,
        service = %binding.service,
        terminator = binding.terminator.as_deref().unwrap_or(""),
        "found service binding"
    );

    let overlay = OverlayLib::get();
    let (Some(ctx), Ok(service)) = (
        session.active_context(),
        CString::new(binding.service.as_str()),
    ) else {
        // No loaded identity (or unusable service name): the overlay cannot
        // host this port, bind it for real.
        return real_symbols::require(RealSymbols::get().bind, "bind")(fd, addr, len);
    };

    let terminator = binding
        .terminator
        .as_deref()
        .and_then(|t| CString::new(t).ok());

    match overlay.bind_service(fd, ctx, &service, terminator.as_deref()) {
        Some(0) => 0,
        Some(rc) => {
            let err = overlay.last_error();
            warn!(fd, port, rc, err, "overlay bind error");
            normalize_bind_rc(rc, err)
        }
        None => real_symbols::require(RealSymbols::get().bind, "bind")(fd, addr, len),
    }
}

#[no_mangle]
pub unsafe extern "C" fn listen(fd: c_int, backlog: c_int) -> c_int {
    debug!(fd, backlog, "in listen");

    match OverlayLib::get().listen(fd, backlog) {
        Some(0) => 0,
        _ => real_symbols::require(RealSymbols::get().listen, "listen")(fd, backlog),
    }
}

unsafe fn accept_common(fd: c_int) -> Option<(c_int, [c_char; CALLER_BUF_LEN])> {
    let mut caller = [0 as c_char; CALLER_BUF_LEN];
    match OverlayLib::get().accept(fd, &mut caller) {
        Some(clt) if clt != -1 => Some((clt, caller)),
        _ => None,
    }
}

#[no_mangle]
pub unsafe extern "C" fn accept(
    fd: c_int,
    addr: *mut libc::sockaddr,
    socklen: *mut libc::socklen_t,
) -> c_int {
    debug!(fd, "in accept");

    match accept_common(fd) {
        Some((clt, caller)) => {
            let identity = CStr::from_ptr(caller.as_ptr());
            sockaddr::store_unix_peer(addr, socklen, identity.to_bytes());
            debug!(client = clt, caller = %identity.to_string_lossy(), "accepted overlay client");
            clt
        }
        None => real_symbols::require(RealSymbols::get().accept, "accept")(fd, addr, socklen),
    }
}

#[no_mangle]
pub unsafe extern "C" fn accept4(
    fd: c_int,
    addr: *mut libc::sockaddr,
    socklen: *mut libc::socklen_t,
    flags: c_int,
) -> c_int {
    debug!(fd, flags, "in accept4");

    match accept_common(fd) {
        Some((clt, caller)) => {
            let identity = CStr::from_ptr(caller.as_ptr());
            sockaddr::store_unix_peer(addr, socklen, identity.to_bytes());
            debug!(client = clt, caller = %identity.to_string_lossy(), "accepted overlay client");
            clt
        }
        None => {
            real_symbols::require(RealSymbols::get().accept4, "accept4")(fd, addr, socklen, flags)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::mem;
    use std::net::Ipv4Addr;

    use super::*;

    fn v4_bind_addr(port: u16) -> libc::sockaddr_in {
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        sa.sin_family = libc::AF_INET as libc::sa_family_t;
        sa.sin_port = port.to_be();
        sa.sin_addr.s_addr = u32::from_ne_bytes(Ipv4Addr::UNSPECIFIED.octets());
        sa
    }

    #[test]
    fn test_already_hosted_bind_is_success() {
        assert_eq!(normalize_bind_rc(-1, libc::EALREADY), 0);
        assert_eq!(normalize_bind_rc(7, libc::EALREADY), 0);
    }

    #[test]
    fn test_other_bind_errors_pass_through() {
        assert_eq!(normalize_bind_rc(0, 0), 0);
        assert_eq!(normalize_bind_rc(-1, libc::ECONNREFUSED), -1);
        assert_eq!(normalize_bind_rc(7, 0), 7);
    }

    #[test]
    fn test_bind_invalid_family_is_einval() {
        let mut un: libc::sockaddr_un = unsafe { mem::zeroed() };
        un.sun_family = libc::AF_UNIX as libc::sa_family_t;

        let rc = unsafe {
            bind(
                -1,
                (&un as *const libc::sockaddr_un).cast(),
                mem::size_of::<libc::sockaddr_un>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, -1);
        assert_eq!(unsafe { *libc::__errno_location() }, libc::EINVAL);
    }

    #[test]
    fn test_bind_unbound_port_reaches_real_bind() {
        // No binding table entry and no overlay in the test process: the
        // call must behave exactly like the real bind, which rejects a bad
        // descriptor with EBADF.
        let sa = v4_bind_addr(39999);
        let rc = unsafe {
            bind(
                -1,
                (&sa as *const libc::sockaddr_in).cast(),
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        assert_eq!(rc, -1);
        assert_eq!(unsafe { *libc::__errno_location() }, libc::EBADF);
    }

    #[test]
    fn test_listen_falls_back_without_overlay() {
        let rc = unsafe { listen(-1, 8) };
        assert_eq!(rc, -1);
        assert_eq!(unsafe { *libc::__errno_location() }, libc::EBADF);
    }

    #[test]
    fn test_accept_falls_back_without_overlay() {
        let rc = unsafe { accept(-1, std::ptr::null_mut(), std::ptr::null_mut()) };
        assert_eq!(rc, -1);
        assert_eq!(unsafe { *libc::__errno_location() }, libc::EBADF);
    }
}
