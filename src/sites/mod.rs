// src/sites/mod.rs

//! Per-store extraction capabilities.
//!
//! Every upstream platform gets one extractor conforming to a single
//! input/output contract, so the polling loop stays identical across
//! stores. Adding a platform means implementing `Extractor` and wiring
//! it into `build_extractor`.

mod shopify;
mod snkrs;

pub use shopify::ShopifyExtractor;
pub use snkrs::SnkrsExtractor;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{Product, StoreSchedule};
use crate::services::RequestClient;

/// Turns one upstream page/response into a normalized product list.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch and normalize the product list for one keyword.
    ///
    /// An empty keyword means "no search term"; extractors that are
    /// search-driven return an empty list in that case.
    async fn extract(&self, client: &RequestClient, keyword: &str) -> Result<Vec<Product>>;
}

/// Build the extractor for a store's platform.
pub fn build_extractor(schedule: &StoreSchedule) -> Result<Box<dyn Extractor>> {
    match schedule.platform.as_str() {
        "shopify" => Ok(Box::new(ShopifyExtractor::new(schedule)?)),
        "snkrs" => Ok(Box::new(SnkrsExtractor::new(schedule))),
        other => Err(AppError::config(format!(
            "Unsupported platform '{}' for store {}",
            other, schedule.name
        ))),
    }
}
