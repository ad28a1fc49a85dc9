use anyhow::{Context, Result};
use std::sync::Arc;

use slotroster::config::Config;
use slotroster::metrics;
use slotroster::scheduler::{RefreshScheduler, SchedulerService, SlotSink, TriggerConfig};

/// Slot sink that only logs what would be shown on each slot
struct LoggingSink;

impl SlotSink for LoggingSink {
    fn apply_slot(&self, slot: u32, name: &str) {
        if name.is_empty() {
            tracing::info!(slot, "Slot cleared");
        } else {
            tracing::info!(slot, name, "Slot assigned");
        }
    }
}

/// Run the refresh tasks until Ctrl-C
pub async fn run(config: Config, log_slots: bool) -> Result<()> {
    config.validate()?;

    metrics::init_metrics().map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {e}"))?;

    let service = Arc::new(
        SchedulerService::from_config(&config).context("Failed to create provider client")?,
    );

    if let Err(e) = service.check_configuration().await {
        tracing::warn!(error = %e, "Scheduler is not fully configured; refreshes will be skipped");
    }

    println!("Starting slotroster scheduler");
    println!("=============================");
    println!("  Groups: {}", config.groups.len());
    println!("  Slots: {}", config.scheduler.slot_count);
    println!("  Live check: {}s", config.scheduler.live_check_interval_secs);
    println!("Press Ctrl-C to stop");

    let mut scheduler = RefreshScheduler::new(
        Arc::clone(&service),
        TriggerConfig::from(&config.scheduler),
    );
    if log_slots {
        scheduler = scheduler.with_sink(Arc::new(LoggingSink));
    }
    let handle = scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("\nShutting down...");
    handle.shutdown().await;

    println!("{}", service.status().await.display());

    if let Ok(text) = metrics::gather_metrics() {
        tracing::debug!(metrics = %text, "Final metrics");
    }

    Ok(())
}
