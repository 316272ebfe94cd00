// src/interception/sockaddr.rs
//! Socket-address views shared by the interposed entry points
//!
//! The hooks receive raw `sockaddr` pointers from foreign callers. These
//! helpers centralize the unsafe extraction of IPv4 (and v4-mapped IPv6)
//! destinations, the bind-side port, and the synthesis of the
//! `"ziti:<caller>"` peer address reported by `accept`.

use std::ffi::{c_char, c_int};
use std::net::Ipv4Addr;

/// Peer-identity prefix written into the synthesized accept address.
pub const PEER_PREFIX: &[u8] = b"ziti:";

/// Extract an IPv4 destination and host-order port from a caller-supplied
/// address.
///
/// Understands `AF_INET` and v4-mapped `AF_INET6`; anything else yields
/// `None`.
///
/// # Safety
///
/// `addr` must be null or point to a valid sockaddr of at least the length
/// its family implies.
pub unsafe fn dest_v4(addr: *const libc::sockaddr) -> Option<(Ipv4Addr, u16)> {
    if addr.is_null() {
        return None;
    }

    match c_int::from((*addr).sa_family) {
        libc::AF_INET => {
            let addr4 = &*addr.cast::<libc::sockaddr_in>();
            Some((
                Ipv4Addr::from(addr4.sin_addr.s_addr.to_ne_bytes()),
                u16::from_be(addr4.sin_port),
            ))
        }
        libc::AF_INET6 => {
            let addr6 = &*addr.cast::<libc::sockaddr_in6>();
            let octets = addr6.sin6_addr.s6_addr;
            if octets[..10] == [0u8; 10] && octets[10] == 0xff && octets[11] == 0xff {
                let v4: [u8; 4] = [octets[12], octets[13], octets[14], octets[15]];
                Some((Ipv4Addr::from(v4), u16::from_be(addr6.sin6_port)))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Extract the host-order local port from a bind address.
///
/// Only `AF_INET` and `AF_INET6` are supported; other families yield `None`
/// and the bind hook turns that into `EINVAL`.
///
/// # Safety
///
/// Same contract as [`dest_v4`].
pub unsafe fn bind_port(addr: *const libc::sockaddr) -> Option<u16> {
    if addr.is_null() {
        return None;
    }

    match c_int::from((*addr).sa_family) {
        libc::AF_INET => {
            let addr4 = &*addr.cast::<libc::sockaddr_in>();
            Some(u16::from_be(addr4.sin_port))
        }
        libc::AF_INET6 => {
            let addr6 = &*addr.cast::<libc::sockaddr_in6>();
            Some(u16::from_be(addr6.sin6_port))
        }
        _ => None,
    }
}

/// Copy `src` into a caller buffer with snprintf semantics: truncate to
/// capacity, always NUL-terminate when capacity allows.
///
/// # Safety
///
/// `dst` must be null or valid for `cap` bytes.
pub unsafe fn write_truncated(dst: *mut c_char, cap: usize, src: &[u8]) {
    if dst.is_null() || cap == 0 {
        return;
    }
    let n = src.len().min(cap - 1);
    std::ptr::copy_nonoverlapping(src.as_ptr().cast::<c_char>(), dst, n);
    *dst.add(n) = 0;
}

/// Build the `AF_UNIX` peer address `"ziti:<caller>"` for an accepted
/// overlay client.
///
/// The identity is truncated to what `sun_path` holds; the buffer is never
/// overrun.
pub fn unix_peer(caller: &[u8]) -> libc::sockaddr_un {
    // SAFETY: sockaddr_un is plain old data; an all-zero value is valid.
    let mut peer: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    peer.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let mut path = Vec::with_capacity(PEER_PREFIX.len() + caller.len());
    path.extend_from_slice(PEER_PREFIX);
    path.extend_from_slice(caller);
    unsafe {
        write_truncated(peer.sun_path.as_mut_ptr(), peer.sun_path.len(), &path);
    }
    peer
}

/// Store a synthesized peer address into accept's value-result output,
/// truncating to the caller's stated capacity and reporting the full
/// synthetic length.
///
/// # Safety
///
/// `addr` and `socklen` must be null or valid; `*socklen` must state the
/// capacity of `addr` as per the accept contract.
pub unsafe fn store_unix_peer(
    addr: *mut libc::sockaddr,
    socklen: *mut libc::socklen_t,
    caller: &[u8],
) {
    if addr.is_null() || socklen.is_null() {
        return;
    }

    let peer = unix_peer(caller);
    let full = std::mem::size_of::<libc::sockaddr_un>();
    let cap = (*socklen) as usize;
    std::ptr::copy_nonoverlapping(
        (&peer as *const libc::sockaddr_un).cast::<u8>(),
        addr.cast::<u8>(),
        full.min(cap),
    );
    *socklen = full as libc::socklen_t;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;
    use std::mem;

    fn v4_sockaddr(addr: Ipv4Addr, port: u16) -> libc::sockaddr_in {
        let mut sa: libc::sockaddr_in = unsafe { mem::zeroed() };
        sa.sin_family = libc::AF_INET as libc::sa_family_t;
        sa.sin_port = port.to_be();
        sa.sin_addr.s_addr = u32::from_ne_bytes(addr.octets());
        sa
    }

    #[test]
    fn test_dest_v4_plain() {
        let sa = v4_sockaddr(Ipv4Addr::new(100, 64, 0, 7), 8080);
        let got = unsafe { dest_v4((&sa as *const libc::sockaddr_in).cast()) };
        assert_eq!(got, Some((Ipv4Addr::new(100, 64, 0, 7), 8080)));
    }

    #[test]
    fn test_dest_v4_mapped_v6() {
        let mut sa6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
        sa6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        sa6.sin6_port = 443u16.to_be();
        let mut octets = [0u8; 16];
        octets[10] = 0xff;
        octets[11] = 0xff;
        octets[12..].copy_from_slice(&[10, 1, 2, 3]);
        sa6.sin6_addr.s6_addr = octets;

        let got = unsafe { dest_v4((&sa6 as *const libc::sockaddr_in6).cast()) };
        assert_eq!(got, Some((Ipv4Addr::new(10, 1, 2, 3), 443)));
    }

    #[test]
    fn test_dest_v4_rejects_native_v6_and_unix() {
        let mut sa6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
        sa6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        sa6.sin6_addr.s6_addr[0] = 0x20; // 2000::/3, not v4-mapped
        assert!(unsafe { dest_v4((&sa6 as *const libc::sockaddr_in6).cast()) }.is_none());

        let mut un: libc::sockaddr_un = unsafe { mem::zeroed() };
        un.sun_family = libc::AF_UNIX as libc::sa_family_t;
        assert!(unsafe { dest_v4((&un as *const libc::sockaddr_un).cast()) }.is_none());

        assert!(unsafe { dest_v4(std::ptr::null()) }.is_none());
    }

    #[test]
    fn test_bind_port_families() {
        let sa = v4_sockaddr(Ipv4Addr::UNSPECIFIED, 9090);
        assert_eq!(
            unsafe { bind_port((&sa as *const libc::sockaddr_in).cast()) },
            Some(9090)
        );

        let mut sa6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
        sa6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
        sa6.sin6_port = 9091u16.to_be();
        assert_eq!(
            unsafe { bind_port((&sa6 as *const libc::sockaddr_in6).cast()) },
            Some(9091)
        );

        let mut un: libc::sockaddr_un = unsafe { mem::zeroed() };
        un.sun_family = libc::AF_UNIX as libc::sa_family_t;
        assert!(unsafe { bind_port((&un as *const libc::sockaddr_un).cast()) }.is_none());
    }

    #[test]
    fn test_unix_peer_embeds_identity() {
        let peer = unix_peer(b"client-7");
        assert_eq!(c_int::from(peer.sun_family), libc::AF_UNIX);
        let path = unsafe { CStr::from_ptr(peer.sun_path.as_ptr()) };
        assert_eq!(path.to_bytes(), b"ziti:client-7");
    }

    #[test]
    fn test_unix_peer_truncates_long_identity() {
        let long = vec![b'x'; 4096];
        let peer = unix_peer(&long);
        let path = unsafe { CStr::from_ptr(peer.sun_path.as_ptr()) };
        assert!(path.to_bytes().len() < peer.sun_path.len());
        assert!(path.to_bytes().starts_with(b"ziti:"));
    }

    #[test]
    fn test_store_unix_peer_respects_capacity() {
        let mut buf: libc::sockaddr_un = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_un>() as libc::socklen_t;
        unsafe {
            store_unix_peer(
                (&mut buf as *mut libc::sockaddr_un).cast(),
                &mut len,
                b"peer",
            );
        }
        assert_eq!(len as usize, mem::size_of::<libc::sockaddr_un>());
        let path = unsafe { CStr::from_ptr(buf.sun_path.as_ptr()) };
        assert_eq!(path.to_bytes(), b"ziti:peer");

        // Short caller buffer: only family bytes fit, length still reports
        // the full synthetic size.
        let mut short: libc::sockaddr = unsafe { mem::zeroed() };
        let mut short_len = 2 as libc::socklen_t;
        unsafe { store_unix_peer(&mut short, &mut short_len, b"peer") };
        assert_eq!(short_len as usize, mem::size_of::<libc::sockaddr_un>());
        assert_eq!(c_int::from(short.sa_family), libc::AF_UNIX);
    }

    #[test]
    fn test_write_truncated_is_nul_terminated() {
        let mut buf = [0x7f as c_char; 8];
        unsafe { write_truncated(buf.as_mut_ptr(), buf.len(), b"longer-than-buffer") };
        let s = unsafe { CStr::from_ptr(buf.as_ptr()) };
        assert_eq!(s.to_bytes(), b"longer-");
    }
}
