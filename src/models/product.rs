//! Product snapshot and stock transition data structures.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One product as observed during a single poll.
///
/// Sizes map a variant label (e.g. "9.5") to its availability. A
/// `BTreeMap` keeps variant ordering deterministic so diff lists come out
/// stable between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    /// Stable identity within one store (URL or source-assigned id)
    pub id: String,

    /// Display title
    pub title: String,

    /// Display price, kept as an opaque string
    pub price: String,

    /// Product image URL
    pub image: String,

    /// Product page URL
    pub url: String,

    /// Source store tag
    pub site: String,

    /// Variant label to availability
    pub sizes: BTreeMap<String, bool>,
}

impl Product {
    /// Variant labels currently marked available.
    pub fn available_sizes(&self) -> Vec<String> {
        self.sizes
            .iter()
            .filter(|&(_, &available)| available)
            .map(|(size, _)| size.clone())
            .collect()
    }

    /// All variant labels, for display.
    pub fn size_summary(&self) -> String {
        self.sizes.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Stock transitions between two snapshots of the same identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockDiff {
    /// The identity was never seen before
    pub is_new: bool,

    /// Available variants on a brand-new identity
    pub new_sizes: Vec<String>,

    /// Variants that flipped unavailable -> available on an existing identity
    pub restocked: Vec<String>,

    /// Variants that flipped available -> unavailable
    pub out_of_stock: Vec<String>,
}

impl StockDiff {
    /// Whether any transition was observed at all.
    pub fn has_changes(&self) -> bool {
        self.is_new
            || !self.new_sizes.is_empty()
            || !self.restocked.is_empty()
            || !self.out_of_stock.is_empty()
    }

    /// Whether this diff warrants a notification.
    ///
    /// Pure sell-out transitions never notify.
    pub fn should_notify(&self) -> bool {
        self.is_new || !self.new_sizes.is_empty() || !self.restocked.is_empty()
    }
}
