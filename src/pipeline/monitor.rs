// src/pipeline/monitor.rs

//! Per-store polling loop.
//!
//! Each monitor owns its own snapshot cache and runs as an independent
//! task: a slow or blocked store never delays another. Failures inside
//! one iteration are caught at the loop boundary so the loop always
//! reaches its sleep and tries again.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::Result;
use crate::models::{MonitorMode, Product, StoreSchedule};
use crate::notify::{build_restock_embed, NotificationSink};
use crate::pipeline::ProductCache;
use crate::services::RequestClient;
use crate::sites::Extractor;

/// Bounds for the politeness delay between per-keyword fetches, so a
/// multi-keyword iteration does not burst the upstream.
const KEYWORD_DELAY_MS: std::ops::RangeInclusive<u64> = 200..=700;

/// Cooperative stop switch for one monitor.
#[derive(Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request the monitor to exit after its current iteration. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The polling loop for one configured store.
pub struct StoreMonitor {
    schedule: StoreSchedule,
    extractor: Box<dyn Extractor>,
    client: RequestClient,
    cache: ProductCache,
    sink: Arc<dyn NotificationSink>,
    stopped: Arc<AtomicBool>,
}

impl StoreMonitor {
    pub fn new(
        schedule: StoreSchedule,
        extractor: Box<dyn Extractor>,
        client: RequestClient,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            schedule,
            extractor,
            client,
            cache: ProductCache::new(),
            sink,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.schedule.name
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stopped))
    }

    /// Poll until stopped. Never returns early on iteration failures.
    pub async fn run(mut self) {
        log::info!("Starting monitor for {}", self.schedule.name);
        while !self.stopped.load(Ordering::SeqCst) {
            if let Err(error) = self.poll_once().await {
                if error.is_blocked() {
                    log::warn!(
                        "Monitor {} is being rate-limited upstream: {error}",
                        self.schedule.name
                    );
                } else {
                    log::error!("Monitor {} iteration failed: {error}", self.schedule.name);
                }
            }
            tokio::time::sleep(self.schedule.refresh + self.schedule.jitter.sample()).await;
        }
        log::info!("Monitor {} stopped", self.schedule.name);
    }

    /// One fetch → filter → diff → notify cycle.
    async fn poll_once(&mut self) -> Result<()> {
        let keywords = if self.schedule.keywords.is_empty() {
            vec![String::new()]
        } else {
            self.schedule.keywords.clone()
        };

        let mut products = Vec::new();
        for (index, keyword) in keywords.iter().enumerate() {
            match self.extractor.extract(&self.client, keyword).await {
                Ok(mut found) => {
                    for product in &mut found {
                        if product.site.is_empty() {
                            product.site = self.schedule.name.clone();
                        }
                    }
                    products.append(&mut found);
                }
                Err(error) => {
                    // Soft failure: skip this keyword, keep the iteration alive.
                    log::warn!(
                        "Extraction failed for {} keyword '{keyword}': {error}",
                        self.schedule.name
                    );
                }
            }
            if index + 1 < keywords.len() {
                tokio::time::sleep(politeness_delay()).await;
            }
        }

        let filtered = self.filter_products(products);
        let valid_ids: HashSet<String> = filtered
            .iter()
            .filter(|product| !product.id.is_empty())
            .map(|product| product.id.clone())
            .collect();
        self.cache.prune(&valid_ids);

        for product in filtered {
            if product.id.is_empty() {
                continue;
            }
            let diff = self.cache.diff(&product.id, product.clone());
            if diff.should_notify() {
                let embed = build_restock_embed(&product, &diff);
                let report = self.sink.publish(&embed).await;
                if report.failed > 0 {
                    log::warn!(
                        "{} of {} webhook deliveries failed for {}",
                        report.failed,
                        report.failed + report.delivered,
                        product.title
                    );
                }
            }
        }
        Ok(())
    }

    fn filter_products(&self, products: Vec<Product>) -> Vec<Product> {
        match self.schedule.mode {
            MonitorMode::Keywords if !self.schedule.keywords.is_empty() => products
                .into_iter()
                .filter(|product| {
                    let title = product.title.to_lowercase();
                    self.schedule
                        .keywords
                        .iter()
                        .any(|keyword| title.contains(keyword))
                })
                .collect(),
            MonitorMode::Url => {
                if self.schedule.product_ids.is_empty() && self.schedule.product_urls.is_empty() {
                    return products;
                }
                products
                    .into_iter()
                    .filter(|product| {
                        self.schedule
                            .product_ids
                            .contains(&product.id.to_lowercase())
                            || self
                                .schedule
                                .product_urls
                                .contains(&product.url.to_lowercase())
                    })
                    .collect()
            }
            _ => products,
        }
    }
}

fn politeness_delay() -> Duration {
    Duration::from_millis(rand::rng().random_range(KEYWORD_DELAY_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::AppError;
    use crate::models::{Config, StoreConfig};
    use crate::notify::{DeliveryReport, Embed};
    use crate::services::{HttpSession, ProxyPool};

    /// Replays a scripted sequence of poll results.
    struct ScriptedExtractor {
        polls: Mutex<VecDeque<Result<Vec<Product>>>>,
    }

    impl ScriptedExtractor {
        fn new(polls: Vec<Result<Vec<Product>>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
            }
        }
    }

    #[async_trait]
    impl Extractor for ScriptedExtractor {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn extract(&self, _client: &RequestClient, _keyword: &str) -> Result<Vec<Product>> {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Records every published embed instead of delivering it.
    #[derive(Default)]
    struct RecordingSink {
        embeds: Mutex<Vec<Embed>>,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn publish(&self, embed: &Embed) -> DeliveryReport {
            self.embeds.lock().unwrap().push(embed.clone());
            DeliveryReport {
                delivered: 1,
                failed: 0,
            }
        }
    }

    fn store_config() -> StoreConfig {
        StoreConfig {
            name: "Test Store".to_string(),
            platform: "shopify".to_string(),
            base_url: "https://example.com".to_string(),
            search_path: None,
            refresh_interval: None,
            jitter: None,
            keywords: None,
            mode: None,
            product_ids: Vec::new(),
            product_urls: Vec::new(),
            max_retries: None,
            backoff_factor: None,
            timeout_secs: None,
        }
    }

    fn monitor_with(
        store: StoreConfig,
        config: Config,
        polls: Vec<Result<Vec<Product>>>,
        sink: Arc<RecordingSink>,
    ) -> StoreMonitor {
        let schedule = StoreSchedule::resolve(&store, &config);
        let session = Arc::new(HttpSession::new(Arc::new(ProxyPool::new(Vec::new()))).unwrap());
        let client = RequestClient::new(session, schedule.policy.clone());
        StoreMonitor::new(
            schedule,
            Box::new(ScriptedExtractor::new(polls)),
            client,
            sink,
        )
    }

    fn product(id: &str, title: &str, sizes: &[(&str, bool)]) -> Product {
        Product {
            id: id.to_string(),
            title: title.to_string(),
            price: "$120.00".to_string(),
            image: String::new(),
            url: format!("https://example.com/products/{id}"),
            site: String::new(),
            sizes: sizes
                .iter()
                .map(|(size, available)| (size.to_string(), *available))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn notifies_on_new_then_restock_then_silence_after_delisting() {
        let sink = Arc::new(RecordingSink::default());
        let polls = vec![
            Ok(vec![product(
                "sneaker-1",
                "Sneaker One",
                &[("9", false), ("10", true)],
            )]),
            Ok(vec![product(
                "sneaker-1",
                "Sneaker One",
                &[("9", true), ("10", true)],
            )]),
            Ok(Vec::new()),
        ];
        let mut monitor = monitor_with(store_config(), Config::default(), polls, Arc::clone(&sink));

        monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();

        let embeds = sink.embeds.lock().unwrap();
        assert_eq!(embeds.len(), 2);
        assert!(embeds[0].description.contains("New product"));
        assert!(embeds[0].description.contains("New sizes: 10"));
        assert!(embeds[1].description.contains("Restocks: 9"));

        // The delisted item was pruned, so reappearing counts as new again.
        assert!(monitor.cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sellout_only_transition_stays_silent() {
        let sink = Arc::new(RecordingSink::default());
        let polls = vec![
            Ok(vec![product("p1", "Sneaker", &[("9", true)])]),
            Ok(vec![product("p1", "Sneaker", &[("9", false)])]),
        ];
        let mut monitor = monitor_with(store_config(), Config::default(), polls, Arc::clone(&sink));

        monitor.poll_once().await.unwrap();
        monitor.poll_once().await.unwrap();

        // Only the first poll (new product) notified.
        assert_eq!(sink.embeds.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keyword_failure_does_not_abort_the_iteration() {
        let sink = Arc::new(RecordingSink::default());
        let mut store = store_config();
        store.keywords = Some(vec!["dunk".to_string(), "jordan".to_string()]);
        // First keyword fails, second succeeds.
        let polls = vec![
            Err(AppError::extract("Test Store", "boom")),
            Ok(vec![product("aj1", "Air Jordan 1", &[("9", true)])]),
        ];
        let mut monitor = monitor_with(store, Config::default(), polls, Arc::clone(&sink));

        monitor.poll_once().await.unwrap();

        assert_eq!(sink.embeds.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn keyword_mode_filters_titles_case_insensitively() {
        let sink = Arc::new(RecordingSink::default());
        let mut store = store_config();
        store.keywords = Some(vec!["dunk".to_string()]);
        let polls = vec![Ok(vec![
            product("d1", "Nike DUNK Low", &[("9", true)]),
            product("h1", "Kith Hoodie", &[("M", true)]),
        ])];
        let mut monitor = monitor_with(store, Config::default(), polls, Arc::clone(&sink));

        monitor.poll_once().await.unwrap();

        let embeds = sink.embeds.lock().unwrap();
        assert_eq!(embeds.len(), 1);
        assert_eq!(embeds[0].title, "Nike DUNK Low");
    }

    #[tokio::test(start_paused = true)]
    async fn url_mode_honors_allow_lists() {
        let sink = Arc::new(RecordingSink::default());
        let mut store = store_config();
        store.mode = Some(MonitorMode::Url);
        store.product_ids = vec!["wanted".to_string()];
        let polls = vec![Ok(vec![
            product("wanted", "Wanted Shoe", &[("9", true)]),
            product("other", "Other Shoe", &[("9", true)]),
        ])];
        let mut monitor = monitor_with(store, Config::default(), polls, Arc::clone(&sink));

        monitor.poll_once().await.unwrap();

        let embeds = sink.embeds.lock().unwrap();
        assert_eq!(embeds.len(), 1);
        assert_eq!(embeds[0].title, "Wanted Shoe");
    }

    #[tokio::test(start_paused = true)]
    async fn untagged_products_inherit_the_store_name() {
        let sink = Arc::new(RecordingSink::default());
        let polls = vec![Ok(vec![product("p1", "Sneaker", &[("9", true)])])];
        let mut monitor = monitor_with(store_config(), Config::default(), polls, Arc::clone(&sink));

        monitor.poll_once().await.unwrap();

        let embeds = sink.embeds.lock().unwrap();
        let store_field = embeds[0]
            .fields
            .iter()
            .find(|field| field.name == "Store")
            .unwrap();
        assert_eq!(store_field.value, "Test Store");
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_monitor_exits_without_polling() {
        let sink = Arc::new(RecordingSink::default());
        let polls = vec![Ok(vec![product("p1", "Sneaker", &[("9", true)])])];
        let monitor = monitor_with(store_config(), Config::default(), polls, Arc::clone(&sink));

        let handle = monitor.stop_handle();
        handle.stop();
        handle.stop(); // idempotent
        assert!(handle.is_stopped());

        monitor.run().await;

        assert!(sink.embeds.lock().unwrap().is_empty());
    }
}
