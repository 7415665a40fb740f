// src/notify/discord.rs

//! Discord webhook delivery.

use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::notify::{DeliveryReport, Embed, NotificationSink};

/// Broadcasts embeds to a set of Discord webhooks.
///
/// Delivery uses a plain direct client: webhook traffic never goes
/// through the store-facing proxy rotation. Each destination gets a
/// small bounded retry with a doubling delay.
pub struct DiscordNotifier {
    client: Client,
    webhooks: Vec<String>,
    timeout: Duration,
    max_attempts: u32,
}

impl DiscordNotifier {
    pub fn new(webhooks: Vec<String>) -> Self {
        Self {
            client: Client::new(),
            webhooks,
            timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }

    pub fn webhook_count(&self) -> usize {
        self.webhooks.len()
    }

    async fn send_one(&self, webhook: &str, embed: &Embed) -> Result<()> {
        let payload = WebhookPayload {
            embeds: std::slice::from_ref(embed),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = self
                .client
                .post(webhook)
                .timeout(self.timeout)
                .json(&payload)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    if attempt >= self.max_attempts {
                        return Err(AppError::Upstream {
                            status: status.as_u16(),
                        });
                    }
                }
                Err(error) => {
                    if attempt >= self.max_attempts {
                        return Err(AppError::Http(error));
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordNotifier {
    async fn publish(&self, embed: &Embed) -> DeliveryReport {
        let results = future::join_all(
            self.webhooks
                .iter()
                .map(|webhook| self.send_one(webhook, embed)),
        )
        .await;

        let mut report = DeliveryReport::default();
        for (webhook, result) in self.webhooks.iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    report.failed += 1;
                    log::error!("Failed to deliver embed to {webhook}: {error}");
                }
            }
        }
        report
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    embeds: &'a [Embed],
}

/// Ensure webhook URLs resemble Discord endpoints.
///
/// Loopback hosts are allowed so local delivery stubs work in tests and
/// development.
pub fn validate_webhook_urls(webhooks: &[String]) -> Result<()> {
    for webhook in webhooks {
        let parsed = Url::parse(webhook)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::config(format!(
                "Webhook '{webhook}' must be http(s)"
            )));
        }
        let host = parsed.host_str().unwrap_or("");
        if !host.contains("discord") && host != "127.0.0.1" && host != "localhost" {
            return Err(AppError::config(format!(
                "Webhook '{webhook}' does not look like a Discord endpoint"
            )));
        }
        if !parsed.path().contains("/api/webhooks") && host.contains("discord") {
            log::warn!("Webhook {webhook} does not include '/api/webhooks'; double-check the URL");
        }
    }
    Ok(())
}
