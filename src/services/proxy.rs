// src/services/proxy.rs

//! Round-robin proxy pool shared by all monitors.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::seq::IndexedRandom;

/// Pool of outbound proxy addresses with rotation helpers.
///
/// An empty pool means direct connections. The rotation cursor is the
/// only mutable state and is advanced atomically, so concurrent callers
/// each observe a distinct position in the cycle.
#[derive(Debug, Default)]
pub struct ProxyPool {
    addresses: Vec<String>,
    cursor: AtomicUsize,
}

impl ProxyPool {
    /// Build a pool from configured addresses, dropping blank entries.
    pub fn new(addresses: impl IntoIterator<Item = String>) -> Self {
        let addresses: Vec<String> = addresses
            .into_iter()
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .collect();
        Self {
            addresses,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Next address in the rotation, or `None` when the pool is empty.
    pub fn next_proxy(&self) -> Option<&str> {
        if self.addresses.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        Some(self.addresses[index].as_str())
    }

    /// Random address without touching the rotation cursor.
    pub fn random_proxy(&self) -> Option<&str> {
        self.addresses
            .choose(&mut rand::rng())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// All configured addresses in rotation order.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }
}
