//! Candidate proxy pool and its persisted known-good file

use crate::proxy::models::ProxyAddress;
use crate::proxy::parser::ProxyParser;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Candidate proxies in discovery order, without duplicates
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    addresses: Vec<ProxyAddress>,
    seen: HashSet<ProxyAddress>,
}

impl ProxyPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address; returns false if it was already present
    pub fn insert(&mut self, address: ProxyAddress) -> bool {
        if self.seen.insert(address.clone()) {
            self.addresses.push(address);
            true
        } else {
            false
        }
    }

    pub fn extend<I: IntoIterator<Item = ProxyAddress>>(&mut self, addresses: I) {
        for address in addresses {
            self.insert(address);
        }
    }

    pub fn addresses(&self) -> &[ProxyAddress] {
        &self.addresses
    }

    pub fn into_addresses(self) -> Vec<ProxyAddress> {
        self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Load a persisted proxy file. Missing or unreadable files yield an
    /// empty list; malformed lines are dropped.
    pub fn load<P: AsRef<Path>>(path: P) -> Vec<ProxyAddress> {
        let path = path.as_ref();
        match ProxyParser::parse_file(path) {
            Ok(addresses) => {
                if !addresses.is_empty() {
                    info!("Loaded {} proxies from {}", addresses.len(), path.display());
                }
                addresses
            }
            Err(e) => {
                warn!("{}", e);
                Vec::new()
            }
        }
    }

    /// Overwrite the proxy file. Failure is logged and reported as `false`.
    pub fn save<P: AsRef<Path>>(path: P, addresses: &[ProxyAddress]) -> bool {
        let path = path.as_ref();
        match ProxyParser::save_to_file(addresses, path) {
            Ok(()) => {
                info!("Saved {} proxies to {}", addresses.len(), path.display());
                true
            }
            Err(e) => {
                warn!("Could not persist proxies: {}", e);
                false
            }
        }
    }
}

impl FromIterator<ProxyAddress> for ProxyPool {
    fn from_iter<I: IntoIterator<Item = ProxyAddress>>(iter: I) -> Self {
        let mut pool = ProxyPool::new();
        pool.extend(iter);
        pool
    }
}
