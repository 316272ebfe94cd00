// src/interception/connect_hooks.rs
//! Interposed `connect` and `setsockopt`
//!
//! `connect` is the outbound half of the dispatch: destinations that the
//! overlay (or the fake-address cache) can resolve back to a hostname are
//! connected by hostname+port through the overlay; everything else falls
//! through to the real implementation untouched. The overlay runtime's own
//! loop thread always takes the real path so overlay-internal traffic cannot
//! recurse into the shim.

use std::ffi::{c_int, c_void, CString};
use std::net::Ipv4Addr;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use tracing::debug;

use crate::fake_addr::FakeAddrCache;
use crate::interception::sockaddr;
use crate::overlay::OverlayLib;
use crate::real_symbols::{self, RealSymbols};
use crate::session::Session;

/// Where a `connect` call should be routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectRoute {
    /// Pass through to the real `connect`.
    Real,
    /// Attempt an overlay connection by hostname and port.
    Overlay { host: String, port: u16 },
}

/// Decide the route for one `connect` call.
///
/// `resolve` is the hostname recovery chain (overlay address map, then
/// fake-address cache).
pub fn route_connect(
    on_runtime_thread: bool,
    dest: Option<(Ipv4Addr, u16)>,
    resolve: impl Fn(Ipv4Addr) -> Option<String>,
) -> ConnectRoute {
    if on_runtime_thread {
        return ConnectRoute::Real;
    }

    let Some((addr, port)) = dest else {
        return ConnectRoute::Real;
    };
    if addr.is_unspecified() {
        return ConnectRoute::Real;
    }

    match resolve(addr) {
        Some(host) => ConnectRoute::Overlay { host, port },
        None => ConnectRoute::Real,
    }
}

/// Restores a descriptor's status flags when dropped, so the overlay
/// connect attempt cannot leave the caller's O_NONBLOCK setting disturbed on
/// any path.
struct FlagGuard {
    fd: c_int,
    flags: Option<OFlag>,
}

impl FlagGuard {
    fn save(fd: c_int) -> Self {
        let flags = fcntl(fd, FcntlArg::F_GETFL)
            .ok()
            .map(OFlag::from_bits_truncate);
        Self { fd, flags }
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        if let Some(flags) = self.flags {
            let _ = fcntl(self.fd, FcntlArg::F_SETFL(flags));
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn connect(
    fd: c_int,
    addr: *const libc::sockaddr,
    len: libc::socklen_t,
) -> c_int {
    let overlay = OverlayLib::get();
    let real = || real_symbols::require(RealSymbols::get().connect, "connect")(fd, addr, len);

    // The overlay loop thread reaches the controller through this same
    // symbol while identities are still loading; it must never touch the
    // session barrier.
    let on_loop_thread = overlay.is_runtime_thread();
    if on_loop_thread {
        return real();
    }
    Session::get();

    let dest = sockaddr::dest_v4(addr);
    let route = route_connect(on_loop_thread, dest, |ip| {
        overlay
            .lookup_hostname(ip)
            .or_else(|| FakeAddrCache::global().reverse_lookup(ip))
    });

    match route {
        ConnectRoute::Real => real(),
        ConnectRoute::Overlay { host, port } => {
            let Ok(c_host) = CString::new(host.as_str()) else {
                return real();
            };
            debug!(fd, host = %host, port, "connecting via overlay");

            let rc = {
                let _flags = FlagGuard::save(fd);
                overlay.connect_by_name(fd, &c_host, port)
            };
            match rc {
                Some(0) => 0,
                Some(code) => {
                    debug!(fd, host = %host, code, "overlay connect failed, falling back");
                    real()
                }
                None => real(),
            }
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn setsockopt(
    fd: c_int,
    level: c_int,
    optname: c_int,
    optval: *const c_void,
    optlen: libc::socklen_t,
) -> c_int {
    if OverlayLib::get().is_overlay_socket(fd) {
        // Overlay sockets do not take arbitrary option changes; report
        // success without applying.
        debug!(fd, level, optname, "suppressing setsockopt on overlay socket");
        return 0;
    }

    real_symbols::require(RealSymbols::get().setsockopt, "setsockopt")(
        fd, level, optname, optval, optlen,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_resolve(_: Ipv4Addr) -> Option<String> {
        None
    }

    #[test]
    fn test_runtime_thread_always_goes_real() {
        let dest = Some((Ipv4Addr::new(100, 64, 0, 1), 80));
        let route = route_connect(true, dest, |_| Some("svc.internal".into()));
        assert_eq!(route, ConnectRoute::Real);
    }

    #[test]
    fn test_runtime_thread_route_never_resolves() {
        // The loop thread's calls must be routed real without touching any
        // lazy state, or identity loading can wait on itself.
        let dest = Some((Ipv4Addr::new(100, 64, 0, 1), 80));
        let route = route_connect(true, dest, |_| {
            panic!("resolution must not run for loop-thread calls")
        });
        assert_eq!(route, ConnectRoute::Real);
    }

    #[test]
    fn test_unresolvable_destination_goes_real() {
        let dest = Some((Ipv4Addr::new(93, 184, 216, 34), 443));
        assert_eq!(route_connect(false, dest, no_resolve), ConnectRoute::Real);
    }

    #[test]
    fn test_missing_or_unspecified_destination_goes_real() {
        assert_eq!(route_connect(false, None, no_resolve), ConnectRoute::Real);
        let unspec = Some((Ipv4Addr::UNSPECIFIED, 80));
        assert_eq!(
            route_connect(false, unspec, |_| Some("svc".into())),
            ConnectRoute::Real
        );
    }

    #[test]
    fn test_resolved_destination_goes_overlay() {
        let dest = Some((Ipv4Addr::new(100, 64, 0, 1), 8443));
        let route = route_connect(false, dest, |_| Some("svc.internal".into()));
        assert_eq!(
            route,
            ConnectRoute::Overlay {
                host: "svc.internal".into(),
                port: 8443
            }
        );
    }

    #[test]
    fn test_fake_cache_backs_the_resolve_chain() {
        let cache = FakeAddrCache::new();
        let addr = cache.allocate_or_get("legacy.internal").unwrap();
        let route = route_connect(false, Some((addr, 5432)), |ip| cache.reverse_lookup(ip));
        assert_eq!(
            route,
            ConnectRoute::Overlay {
                host: "legacy.internal".into(),
                port: 5432
            }
        );
    }
}
