//! Snapshot cache and diff calculation for restock detection.
//!
//! Each monitor owns exactly one cache, so no locking is needed. The
//! cache is volatile: it is rebuilt from the first poll of each run.

use std::collections::{HashMap, HashSet};

use crate::models::{Product, StockDiff};

/// Last-known snapshot per product identity, with diffing and pruning.
#[derive(Debug, Default)]
pub struct ProductCache {
    products: HashMap<String, Product>,
}

impl ProductCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare a new snapshot against the cached one and record it.
    ///
    /// A never-seen identity reports its available variants as new sizes.
    /// On an existing identity, a variant absent or unavailable before and
    /// available now is a restock; a variant available before and absent
    /// or unavailable now is out of stock. The new snapshot always
    /// replaces the cached one, whether or not anything changed.
    pub fn diff(&mut self, id: &str, snapshot: Product) -> StockDiff {
        let mut diff = StockDiff::default();

        match self.products.get(id) {
            None => {
                diff.is_new = true;
                diff.new_sizes = snapshot.available_sizes();
            }
            Some(previous) => {
                for (size, &available) in &snapshot.sizes {
                    let was_available = previous.sizes.get(size).copied().unwrap_or(false);
                    if available && !was_available {
                        diff.restocked.push(size.clone());
                    }
                }
                for (size, &was_available) in &previous.sizes {
                    let still_available = snapshot.sizes.get(size).copied().unwrap_or(false);
                    if was_available && !still_available {
                        diff.out_of_stock.push(size.clone());
                    }
                }
            }
        }

        self.products.insert(id.to_string(), snapshot);
        diff
    }

    /// Drop every identity not present upstream anymore.
    ///
    /// Run once per poll cycle to bound memory to the current catalog.
    pub fn prune(&mut self, valid_ids: &HashSet<String>) {
        self.products.retain(|id, _| valid_ids.contains(id));
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.products.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(id: &str, sizes: &[(&str, bool)]) -> Product {
        Product {
            id: id.to_string(),
            title: format!("Product {id}"),
            price: "$120.00".to_string(),
            image: String::new(),
            url: format!("https://example.com/products/{id}"),
            site: "Test".to_string(),
            sizes: sizes
                .iter()
                .map(|(size, available)| (size.to_string(), *available))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn first_sighting_reports_available_sizes_only() {
        let mut cache = ProductCache::new();
        let diff = cache.diff("p1", snapshot("p1", &[("8", true), ("9", false), ("10", true)]));

        assert!(diff.is_new);
        assert_eq!(diff.new_sizes, vec!["10", "8"]);
        assert!(diff.restocked.is_empty());
        assert!(diff.out_of_stock.is_empty());
    }

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let mut cache = ProductCache::new();
        cache.diff("p1", snapshot("p1", &[("8", true), ("9", false)]));
        let diff = cache.diff("p1", snapshot("p1", &[("8", true), ("9", false)]));

        assert!(!diff.is_new);
        assert!(!diff.has_changes());
    }

    #[test]
    fn unseen_available_variant_counts_as_restock() {
        // Old {A: true, B: false}, new {A: false, B: true, C: true}.
        // C was never seen on this identity; absent is treated as
        // unavailable, so its appearance in stock is a restock.
        let mut cache = ProductCache::new();
        cache.diff("p1", snapshot("p1", &[("A", true), ("B", false)]));
        let diff = cache.diff("p1", snapshot("p1", &[("A", false), ("B", true), ("C", true)]));

        assert!(!diff.is_new);
        assert!(diff.new_sizes.is_empty());
        assert_eq!(diff.restocked, vec!["B", "C"]);
        assert_eq!(diff.out_of_stock, vec!["A"]);
    }

    #[test]
    fn dropped_available_variant_counts_as_out_of_stock() {
        let mut cache = ProductCache::new();
        cache.diff("p1", snapshot("p1", &[("8", true)]));
        let diff = cache.diff("p1", snapshot("p1", &[("9", false)]));

        assert_eq!(diff.out_of_stock, vec!["8"]);
        assert!(diff.restocked.is_empty());
    }

    #[test]
    fn diff_replaces_the_cached_snapshot() {
        let mut cache = ProductCache::new();
        cache.diff("p1", snapshot("p1", &[("8", false)]));
        cache.diff("p1", snapshot("p1", &[("8", true)]));
        // A third identical poll sees the updated snapshot, not the first.
        let diff = cache.diff("p1", snapshot("p1", &[("8", true)]));
        assert!(!diff.has_changes());
    }

    #[test]
    fn prune_removes_exactly_the_delisted_ids() {
        let mut cache = ProductCache::new();
        cache.diff("x", snapshot("x", &[("8", true)]));
        cache.diff("y", snapshot("y", &[("8", true)]));
        cache.diff("z", snapshot("z", &[("8", true)]));

        cache.prune(&ids(&["x", "y"]));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains("x"));
        assert!(cache.contains("y"));
        assert!(!cache.contains("z"));

        // A pruned identity is brand-new when it reappears.
        let diff = cache.diff("z", snapshot("z", &[("8", true)]));
        assert!(diff.is_new);
    }

    #[test]
    fn restock_scenario_across_three_polls() {
        let mut cache = ProductCache::new();

        // Poll 1: first sighting, only size 10 available.
        let first = cache.diff("sneaker-1", snapshot("sneaker-1", &[("9", false), ("10", true)]));
        assert!(first.is_new);
        assert_eq!(first.new_sizes, vec!["10"]);
        assert!(first.should_notify());

        // Poll 2: size 9 comes into stock.
        let second = cache.diff("sneaker-1", snapshot("sneaker-1", &[("9", true), ("10", true)]));
        assert!(!second.is_new);
        assert_eq!(second.restocked, vec!["9"]);
        assert!(second.should_notify());

        // Poll 3: the item disappears upstream.
        cache.prune(&HashSet::new());
        assert!(cache.is_empty());
    }
}
