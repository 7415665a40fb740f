//! Utility functions and helpers.

pub mod agents;

use sha2::{Digest, Sha256};
use url::Url;

/// Resolve a potentially relative URL against a base URL.
pub fn resolve_url(base: &Url, href: &str) -> String {
    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// Resolve a URL string against a base URL string.
pub fn resolve(base_url: &str, href: &str) -> Option<String> {
    Url::parse(base_url)
        .ok()
        .map(|base| resolve_url(&base, href))
}

/// Extract a product identity from a URL (looks for common patterns).
pub fn extract_product_id(url: &str) -> Option<String> {
    // Common patterns: /products/<handle>, /launch/t/<slug>, ?pid=123
    let patterns = [
        regex::Regex::new(r"/products/([A-Za-z0-9_-]+)").ok()?,
        regex::Regex::new(r"/(?:launch/)?t/([A-Za-z0-9_-]+)").ok()?,
        regex::Regex::new(r"[?&](?:pid|id|style)=([A-Za-z0-9_-]+)").ok()?,
    ];

    for pattern in &patterns {
        if let Some(caps) = pattern.captures(url) {
            if let Some(id) = caps.get(1) {
                return Some(id.as_str().to_string());
            }
        }
    }
    None
}

/// Stable fallback identity for a product URL.
///
/// Used when the upstream exposes no id and the URL matches none of the
/// known patterns.
pub fn url_identity(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// Best-effort identity for a product URL.
pub fn product_identity(url: &str) -> String {
    extract_product_id(url).unwrap_or_else(|| url_identity(url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_url() {
        let base = Url::parse("https://kith.com/collections/").unwrap();
        assert_eq!(
            resolve_url(&base, "sneakers.html"),
            "https://kith.com/collections/sneakers.html"
        );
        assert_eq!(resolve_url(&base, "/root.html"), "https://kith.com/root.html");
        assert_eq!(
            resolve_url(&base, "https://other.com/x"),
            "https://other.com/x"
        );
    }

    #[test]
    fn test_extract_product_id() {
        assert_eq!(
            extract_product_id("https://kith.com/products/nike-dunk-low?variant=1"),
            Some("nike-dunk-low".to_string())
        );
        assert_eq!(
            extract_product_id("https://www.nike.com/launch/t/air-jordan-1-high"),
            Some("air-jordan-1-high".to_string())
        );
        assert_eq!(extract_product_id("https://example.com/shop/all"), None);
    }

    #[test]
    fn test_url_identity_is_stable() {
        let a = url_identity("https://example.com/shop/all");
        let b = url_identity("https://example.com/shop/all");
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }
}
