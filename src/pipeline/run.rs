// src/pipeline/run.rs

//! Monitor orchestration and coordinated shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::{Config, StoreSchedule};
use crate::notify::{self, DiscordNotifier, NotificationSink};
use crate::pipeline::{StopHandle, StoreMonitor};
use crate::services::{HttpSession, ProxyPool, RequestClient};
use crate::sites;

/// How long cooperative shutdown may take before tasks are aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Launch one polling task per configured store and block until shutdown.
pub async fn run_monitors(config: &Config) -> Result<()> {
    if config.stores.is_empty() {
        return Err(AppError::config(
            "No stores configured; refusing to start an idle service",
        ));
    }
    notify::validate_webhook_urls(&config.webhooks)?;

    let pool = Arc::new(ProxyPool::new(config.proxies.clone()));
    if pool.is_empty() {
        log::warn!("No proxies configured; consider adding some to avoid 429 blocks");
    } else {
        log::info!("Loaded {} proxies for rotation", pool.len());
    }

    let session = Arc::new(HttpSession::new(Arc::clone(&pool))?);
    let notifier = Arc::new(DiscordNotifier::new(config.webhooks.clone()));

    let mut monitors = Vec::new();
    for store in &config.stores {
        let schedule = StoreSchedule::resolve(store, config);
        let extractor = sites::build_extractor(&schedule)?;
        let client = RequestClient::new(Arc::clone(&session), schedule.policy.clone());
        let sink: Arc<dyn NotificationSink> = notifier.clone();
        monitors.push(StoreMonitor::new(schedule, extractor, client, sink));
    }

    banner(config, &monitors);

    if config.monitor.startup_ping {
        let report = notifier.publish(&notify::startup_embed()).await;
        if report.failed > 0 {
            log::warn!(
                "Startup ping failed for {} of {} webhooks",
                report.failed,
                notifier.webhook_count()
            );
        } else {
            log::info!("Startup ping delivered to {} webhooks", report.delivered);
        }
    }

    let tasks: Vec<(String, StopHandle, JoinHandle<()>)> = monitors
        .into_iter()
        .map(|monitor| {
            let name = monitor.name().to_string();
            let stop = monitor.stop_handle();
            (name, stop, tokio::spawn(monitor.run()))
        })
        .collect();

    log::info!("Started {} monitors", tasks.len());

    shutdown_signal().await;
    log::info!("Shutdown signal received; stopping monitors...");

    for (_, stop, _) in &tasks {
        stop.stop();
    }

    // One shared grace deadline; anything still running afterwards is aborted.
    let deadline = Instant::now() + SHUTDOWN_GRACE;
    for (name, _, mut handle) in tasks {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, &mut handle).await {
            Ok(result) => report_exit(&name, result),
            Err(_) => {
                handle.abort();
                report_exit(&name, handle.await);
            }
        }
    }

    log::info!("All monitors stopped");
    Ok(())
}

fn banner(config: &Config, monitors: &[StoreMonitor]) {
    let names: Vec<&str> = monitors.iter().map(StoreMonitor::name).collect();
    log::info!("Stores ({}): {}", names.len(), names.join(", "));
    if config.monitor.keywords.is_empty() {
        log::info!("Keywords: none (global)");
    } else {
        log::info!("Keywords: {}", config.monitor.keywords.join(", "));
    }
    log::info!(
        "Default refresh: {}s | Webhooks: {}",
        config.monitor.refresh_interval,
        config.webhooks.len()
    );
}

fn report_exit(name: &str, result: std::result::Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => log::info!("Monitor {name} exited cleanly"),
        Err(error) if error.is_cancelled() => {
            log::info!("Monitor {name} cancelled during shutdown");
        }
        Err(error) => log::error!("Monitor {name} ended abnormally: {error}"),
    }
}

/// Resolve when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        if let Err(error) = result {
                            log::error!("Failed to listen for ctrl-c: {error}");
                        }
                    }
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                log::error!("Failed to install SIGTERM handler: {error}");
                if let Err(error) = tokio::signal::ctrl_c().await {
                    log::error!("Failed to listen for ctrl-c: {error}");
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(error) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for ctrl-c: {error}");
        }
    }
}
