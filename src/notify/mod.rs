// src/notify/mod.rs

//! Notification payloads and delivery transports.

mod discord;

pub use discord::{validate_webhook_urls, DiscordNotifier};

use async_trait::async_trait;
use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::{Product, StockDiff};

/// Discord caps embed titles at 256 characters.
const MAX_TITLE_LEN: usize = 256;

/// A rich notification payload (Discord embed shape).
#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Thumbnail>,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Per-destination outcome summary for one published payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Delivery transport seam.
///
/// The transport owns its own retry policy; callers only learn the
/// per-destination outcome.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, embed: &Embed) -> DeliveryReport;
}

/// Build the notification payload for a product transition.
pub fn build_restock_embed(product: &Product, diff: &StockDiff) -> Embed {
    let mut segments = Vec::new();
    if diff.is_new {
        segments.push("New product".to_string());
    }
    if !diff.new_sizes.is_empty() {
        segments.push(format!("New sizes: {}", diff.new_sizes.join(", ")));
    }
    if !diff.restocked.is_empty() {
        segments.push(format!("Restocks: {}", diff.restocked.join(", ")));
    }
    let description = segments.join(" | ");

    let mut fields = vec![EmbedField {
        name: "Price".to_string(),
        value: product.price.clone(),
        inline: true,
    }];
    if !product.sizes.is_empty() {
        fields.push(EmbedField {
            name: "Sizes".to_string(),
            value: product.size_summary(),
            inline: false,
        });
    }
    fields.push(EmbedField {
        name: "Store".to_string(),
        value: product.site.clone(),
        inline: true,
    });

    Embed {
        title: truncate_title(&product.title),
        url: product.url.clone(),
        description,
        thumbnail: (!product.image.is_empty()).then(|| Thumbnail {
            url: product.image.clone(),
        }),
        fields,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Health-check embed sent once at startup to confirm delivery.
pub fn startup_embed() -> Embed {
    Embed {
        title: "Sneaker Monitor Startup".to_string(),
        url: String::new(),
        description: "Startup health check completed successfully. Monitors will now begin polling."
            .to_string(),
        thumbnail: None,
        fields: Vec::new(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Grapheme-safe truncation to the embed title limit.
fn truncate_title(title: &str) -> String {
    title.graphemes(true).take(MAX_TITLE_LEN).collect()
}
