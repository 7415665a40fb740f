// src/sites/shopify.rs

//! Extractor for Shopify storefront search pages.
//!
//! Shopify themes embed JSON-LD product entries in the search results
//! page. Scrape those instead of theme-specific markup so one extractor
//! covers most storefronts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Product, StoreSchedule};
use crate::services::RequestClient;
use crate::sites::Extractor;
use crate::utils::{product_identity, resolve};

const DEFAULT_SEARCH_PATH: &str = "/search?q={query}&type=product";

pub struct ShopifyExtractor {
    store_name: String,
    base_url: String,
    search_path: String,
}

impl ShopifyExtractor {
    pub fn new(schedule: &StoreSchedule) -> Result<Self> {
        if schedule.base_url.is_empty() {
            return Err(AppError::config(format!(
                "Shopify store {} requires base_url",
                schedule.name
            )));
        }
        Ok(Self {
            store_name: schedule.name.clone(),
            base_url: schedule.base_url.clone(),
            search_path: schedule
                .search_path
                .clone()
                .unwrap_or_else(|| DEFAULT_SEARCH_PATH.to_string()),
        })
    }

    fn search_url(&self, keyword: &str) -> String {
        let query: String = url::form_urlencoded::byte_serialize(keyword.as_bytes()).collect();
        format!("{}{}", self.base_url, self.search_path.replace("{query}", &query))
    }

    /// Pull products out of the JSON-LD entries in a results page.
    fn parse_products(&self, html: &str, keyword: &str) -> Result<Vec<Product>> {
        let document = Html::parse_document(html);
        let script_sel = parse_selector("script[type=\"application/ld+json\"]")?;

        let mut products = Vec::new();
        for script in document.select(&script_sel) {
            let text: String = script.text().collect();
            let Ok(payload) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            for entry in ld_product_entries(&payload) {
                if let Some(product) = self.normalize(entry, keyword) {
                    products.push(product);
                }
            }
        }
        Ok(products)
    }

    fn normalize(&self, entry: &Value, keyword: &str) -> Option<Product> {
        let title = entry.get("name")?.as_str()?.trim().to_string();
        if title.is_empty() {
            return None;
        }
        if !keyword.is_empty() && !title.to_lowercase().contains(&keyword.to_lowercase()) {
            return None;
        }

        let raw_url = entry.get("url").and_then(Value::as_str).unwrap_or("");
        if raw_url.is_empty() {
            return None;
        }
        let url = resolve(&self.base_url, raw_url).unwrap_or_else(|| raw_url.to_string());

        let image = match entry.get("image") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items
                .first()
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            _ => String::new(),
        };

        let mut price = String::from("Unknown");
        let mut sizes: BTreeMap<String, bool> = BTreeMap::new();
        match entry.get("offers") {
            Some(Value::Object(offer)) => {
                read_offer(offer, &mut price, &mut sizes);
            }
            Some(Value::Array(offers)) => {
                for offer in offers {
                    if let Value::Object(offer) = offer {
                        read_offer(offer, &mut price, &mut sizes);
                    }
                }
            }
            _ => {}
        }
        if sizes.is_empty() {
            // One-size products carry no per-variant offers.
            sizes.insert("OS".to_string(), true);
        }

        Some(Product {
            id: product_identity(&url),
            title,
            price,
            image,
            url,
            site: self.store_name.clone(),
            sizes,
        })
    }
}

fn read_offer(
    offer: &serde_json::Map<String, Value>,
    price: &mut String,
    sizes: &mut BTreeMap<String, bool>,
) {
    if let Some(value) = offer.get("price").or_else(|| offer.get("highPrice")) {
        match value {
            Value::String(s) if !s.is_empty() => *price = s.clone(),
            Value::Number(n) => *price = n.to_string(),
            _ => {}
        }
    }
    let sku = offer
        .get("sku")
        .or_else(|| offer.get("name"))
        .and_then(Value::as_str);
    if let Some(sku) = sku {
        if !sku.is_empty() {
            sizes.insert(sku.to_string(), true);
        }
    }
}

/// Collect `@type: Product` objects from a JSON-LD payload, descending
/// through arrays, `@graph`, `itemListElement`, and `ListItem.item`.
fn ld_product_entries(payload: &Value) -> Vec<&Value> {
    let mut entries = Vec::new();
    collect_products(payload, &mut entries);
    entries
}

fn collect_products<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_products(item, out);
            }
        }
        Value::Object(map) => {
            match map.get("@type").and_then(Value::as_str) {
                Some("Product") => {
                    out.push(value);
                    return;
                }
                Some("ListItem") => {
                    if let Some(item) = map.get("item") {
                        collect_products(item, out);
                    }
                    return;
                }
                _ => {}
            }
            for key in ["@graph", "itemListElement"] {
                if let Some(nested) = map.get(key) {
                    collect_products(nested, out);
                }
            }
        }
        _ => {}
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[async_trait]
impl Extractor for ShopifyExtractor {
    fn name(&self) -> &str {
        &self.store_name
    }

    async fn extract(&self, client: &RequestClient, keyword: &str) -> Result<Vec<Product>> {
        if keyword.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.search_url(keyword);
        let html = client.get_text(&url).await?;
        let products = self.parse_products(&html, keyword)?;
        if products.is_empty() {
            log::debug!("Shopify extractor found no products for {url}");
        }
        Ok(products)
    }
}
