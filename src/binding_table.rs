// src/binding_table.rs
//! Per-port service binding table
//!
//! Maps local ports to hosted overlay services so that inbound
//! `bind`/`listen`/`accept` on an unmodified server binary turn into overlay
//! listeners. Built once from the `ZITI_BINDINGS` environment value
//! (`;`-separated `port:[terminator@]service` entries) and read-only
//! afterward, so lookups need no lock.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::utils::config::ShimConfig;
use crate::utils::errors::{Result, ShimError};

/// One service binding for a local port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub port: u16,
    pub service: String,
    pub terminator: Option<String>,
}

/// Immutable port-to-binding table.
#[derive(Debug, Default)]
pub struct BindingTable {
    by_port: HashMap<u16, Binding>,
}

static TABLE: OnceCell<BindingTable> = OnceCell::new();

impl BindingTable {
    /// The process-wide table, built from the environment on first use.
    pub fn global() -> &'static BindingTable {
        TABLE.get_or_init(|| match ShimConfig::from_env().bindings {
            Some(spec) => Self::parse(&spec),
            None => Self::default(),
        })
    }

    /// Parse a binding specification.
    ///
    /// Malformed entries are logged and skipped; parsing continues with the
    /// remaining entries. A duplicated port keeps the last entry.
    pub fn parse(spec: &str) -> Self {
        let mut by_port = HashMap::new();

        for entry in spec.split(';').filter(|e| !e.is_empty()) {
            match parse_entry(entry) {
                Ok(binding) => {
                    info!(
                        port = binding.port,
                        service = %binding.service,
                        terminator = binding.terminator.as_deref().unwrap_or(""),
                        "added service binding"
                    );
                    by_port.insert(binding.port, binding);
                }
                Err(e) => warn!("{e}"),
            }
        }

        Self { by_port }
    }

    /// Look up the binding for a local port.
    pub fn lookup(&self, port: u16) -> Option<&Binding> {
        self.by_port.get(&port)
    }

    pub fn len(&self) -> usize {
        self.by_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty()
    }
}

/// Parse one `port:[terminator@]service` fragment.
fn parse_entry(entry: &str) -> Result<Binding> {
    let (port_str, target) = entry
        .split_once(':')
        .ok_or_else(|| ShimError::InvalidBinding(entry.to_owned()))?;

    let port: u32 = port_str
        .parse()
        .map_err(|_| ShimError::InvalidBinding(entry.to_owned()))?;
    let port = u16::try_from(port).map_err(|_| ShimError::InvalidPort(entry.to_owned()))?;

    let (terminator, service) = match target.split_once('@') {
        Some((term, service)) => {
            let terminator = (!term.is_empty()).then(|| term.to_owned());
            (terminator, service)
        }
        None => (None, target),
    };

    if service.is_empty() {
        return Err(ShimError::InvalidBinding(entry.to_owned()));
    }

    Ok(Binding {
        port,
        service: service.to_owned(),
        terminator,
    })
}
