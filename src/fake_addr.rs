// src/fake_addr.rs
//! Fake-address cache: hostname <-> synthetic address mapping
//!
//! Legacy resolver clients get back only an address, then later call
//! `connect` with that address plus a port. Overlay service matching needs
//! hostname and port together, and the resolver convention carries no port.
//! This cache closes the gap: resolution hands out a synthetic address for a
//! hostname, and `connect` later turns that address back into the hostname
//! it stands for.
//!
//! Addresses come from the RFC 6598 shared range, allocated monotonically
//! from a fixed base, one per distinct hostname, never reused or evicted for
//! the life of the process. When the counter runs out allocation refuses
//! rather than wrap onto addresses already handed out. Lookup and insert
//! share one mutex so two threads resolving the same hostname cannot
//! allocate twice.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// First synthetic address handed out.
pub const FAKE_ADDR_BASE: Ipv4Addr = Ipv4Addr::new(100, 64, 0, 1);

struct Inner {
    by_host: HashMap<String, Ipv4Addr>,
    by_addr: HashMap<Ipv4Addr, String>,
    // None once the address space is exhausted.
    next: Option<u32>,
}

/// Bidirectional hostname/address cache.
pub struct FakeAddrCache {
    inner: Mutex<Inner>,
}

static CACHE: OnceCell<FakeAddrCache> = OnceCell::new();

impl FakeAddrCache {
    pub fn new() -> Self {
        Self::with_base(FAKE_ADDR_BASE)
    }

    /// A cache allocating from an arbitrary base address.
    pub fn with_base(base: Ipv4Addr) -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_host: HashMap::new(),
                by_addr: HashMap::new(),
                next: Some(u32::from(base)),
            }),
        }
    }

    /// The process-wide cache, created on first use.
    pub fn global() -> &'static FakeAddrCache {
        CACHE.get_or_init(Self::new)
    }

    /// Return the synthetic address for `hostname`, allocating one if this
    /// is the first time the hostname is seen.
    ///
    /// `None` means the address space is exhausted; existing mappings stay
    /// valid and are never reassigned.
    pub fn allocate_or_get(&self, hostname: &str) -> Option<Ipv4Addr> {
        let mut inner = self.inner.lock();
        if let Some(addr) = inner.by_host.get(hostname) {
            return Some(*addr);
        }

        let Some(raw) = inner.next else {
            warn!(host = hostname, "synthetic address space exhausted");
            return None;
        };

        let addr = Ipv4Addr::from(raw);
        inner.next = raw.checked_add(1);
        inner.by_host.insert(hostname.to_owned(), addr);
        inner.by_addr.insert(addr, hostname.to_owned());
        debug!(host = hostname, %addr, "allocated synthetic address");
        Some(addr)
    }

    /// Recover the hostname a synthetic address stands for.
    pub fn reverse_lookup(&self, addr: Ipv4Addr) -> Option<String> {
        self.inner.lock().by_addr.get(&addr).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().by_host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_host.is_empty()
    }
}

impl Default for FakeAddrCache {
    fn default() -> Self {
        Self::new()
    }
}
