// src/sites/snkrs.rs

//! Extractor for the Nike SNKRS launch feed.
//!
//! The launch page ships its state as JSON in a `#__NEXT_DATA__` script
//! tag; product threads live under
//! `props.pageProps.initialState.threads.objects`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::Result;
use crate::models::{Product, StoreSchedule};
use crate::services::RequestClient;
use crate::sites::Extractor;
use crate::utils::product_identity;

const DEFAULT_LAUNCH_URL: &str = "https://www.nike.com/launch";

pub struct SnkrsExtractor {
    store_name: String,
    launch_url: String,
}

impl SnkrsExtractor {
    pub fn new(schedule: &StoreSchedule) -> Self {
        let launch_url = if schedule.base_url.is_empty() {
            DEFAULT_LAUNCH_URL.to_string()
        } else {
            schedule.base_url.clone()
        };
        Self {
            store_name: schedule.name.clone(),
            launch_url,
        }
    }

    fn parse_products(&self, html: &str, keyword: &str) -> Vec<Product> {
        let document = Html::parse_document(html);
        let Ok(script_sel) = Selector::parse("script#__NEXT_DATA__") else {
            return Vec::new();
        };

        let mut products = Vec::new();
        for script in document.select(&script_sel) {
            let text: String = script.text().collect();
            let Ok(payload) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            let Some(threads) = payload
                .pointer("/props/pageProps/initialState/threads/objects")
                .and_then(Value::as_array)
            else {
                continue;
            };
            for thread in threads {
                if let Some(product) = self.normalize(thread, keyword) {
                    products.push(product);
                }
            }
        }
        products
    }

    fn normalize(&self, thread: &Value, keyword: &str) -> Option<Product> {
        let info = thread
            .pointer("/productInfo/0")
            .cloned()
            .unwrap_or(Value::Null);
        let merch = info.get("merchProduct").cloned().unwrap_or(Value::Null);

        let title = merch
            .get("label")
            .and_then(Value::as_str)
            .or_else(|| thread.get("title").and_then(Value::as_str))
            .unwrap_or("")
            .to_string();
        if title.is_empty() {
            return None;
        }
        if !keyword.is_empty() && !title.to_lowercase().contains(&keyword.to_lowercase()) {
            return None;
        }

        let mut url = info
            .pointer("/launchView/productUrl")
            .and_then(Value::as_str)
            .or_else(|| thread.get("url").and_then(Value::as_str))
            .unwrap_or(&self.launch_url)
            .to_string();
        if url.starts_with('/') {
            url = format!("https://www.nike.com{url}");
        }

        let image = info
            .pointer("/imageUrls/productImageUrl")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();

        let price_raw = merch
            .pointer("/price/currentRetailPrice")
            .or_else(|| merch.pointer("/price/msrp"));
        let price = match price_raw.and_then(Value::as_f64) {
            Some(amount) => format!("${amount:.2}"),
            None => price_raw
                .and_then(Value::as_str)
                .unwrap_or("Unknown")
                .to_string(),
        };

        let mut sizes: BTreeMap<String, bool> = BTreeMap::new();
        if let Some(skus) = info.get("skus").and_then(Value::as_array) {
            for sku in skus {
                let size = sku
                    .get("nikeSize")
                    .or_else(|| sku.get("localizedSize"))
                    .and_then(Value::as_str);
                if let Some(size) = size {
                    let available = sku
                        .get("available")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    sizes.insert(size.to_string(), available);
                }
            }
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

#[async_trait]
impl Extractor for SnkrsExtractor {
    fn name(&self) -> &str {
        &self.store_name
    }

    async fn extract(&self, client: &RequestClient, keyword: &str) -> Result<Vec<Product>> {
        let html = client.get_text(&self.launch_url).await?;
        let products = self.parse_products(&html, keyword);
        if products.is_empty() {
            log::debug!("SNKRS extractor found no structured payloads");
        }
        Ok(products)
    }
}
