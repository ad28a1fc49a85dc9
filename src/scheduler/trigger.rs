//! Refresh Scheduler
//!
//! Background tasks driving the scheduler service:
//! - daily refresh shortly after local midnight (details dropped)
//! - live-status re-evaluation on a fixed interval, without provider calls
//! - periodic refresh: every few minutes while a plan is live, otherwise
//!   until shortly after midnight, bounded to `[idle_min, idle_max]`
//! - optionally, pushing the active plan to a slot sink whenever the active
//!   plan or its merged slots change
//!
//! All tasks observe a shared shutdown signal between cycles. A refresh that
//! has started runs to completion.

use chrono::{DateTime, NaiveTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::service::{RefreshKind, SchedulerService, SlotSink};
use super::window::DayBoundary;
use crate::config::SchedulerConfig;
use crate::models::SlotAssignments;

/// Local time of the daily forced refresh
pub fn daily_refresh_time() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 1).unwrap_or(NaiveTime::MIN)
}

/// Local time the idle refresh interval counts down to
pub fn idle_refresh_target() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 1, 0).unwrap_or(NaiveTime::MIN)
}

// ============================================================================
// Trigger Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Live-status re-evaluation interval
    pub live_check_interval: Duration,

    /// Periodic refresh interval while a plan is live
    pub live_refresh_interval: Duration,

    /// Lower bound of the idle refresh interval
    pub idle_refresh_min: Duration,

    /// Upper bound of the idle refresh interval
    pub idle_refresh_max: Duration,

    /// Run a refresh as soon as the tasks start
    pub refresh_on_startup: bool,

    /// Timezone of midnight
    pub day_boundary: DayBoundary,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for TriggerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            live_check_interval: config.live_check_interval(),
            live_refresh_interval: Duration::from_secs(config.live_refresh_interval_secs),
            idle_refresh_min: Duration::from_secs(config.idle_refresh_min_secs),
            idle_refresh_max: Duration::from_secs(config.idle_refresh_max_secs),
            refresh_on_startup: config.refresh_on_startup,
            day_boundary: config.day_boundary(),
        }
    }
}

impl TriggerConfig {
    /// Time until the next daily refresh
    pub fn duration_until_daily_refresh(&self, now: DateTime<Utc>) -> Duration {
        let next = self.day_boundary.next_time_of_day(now, daily_refresh_time());
        (next - now).to_std().unwrap_or(Duration::from_secs(1))
    }

    /// Delay before the next periodic refresh
    pub fn periodic_refresh_delay(&self, now: DateTime<Utc>, is_live: bool) -> Duration {
        if is_live {
            return self.live_refresh_interval;
        }

        let target = self.day_boundary.next_time_of_day(now, idle_refresh_target());
        let until_target = (target - now).to_std().unwrap_or(self.idle_refresh_min);
        until_target.clamp(
            self.idle_refresh_min,
            self.idle_refresh_max.max(self.idle_refresh_min),
        )
    }
}

// ============================================================================
// Refresh Scheduler
// ============================================================================

/// Spawns and owns the background refresh tasks
pub struct RefreshScheduler {
    service: Arc<SchedulerService>,
    config: TriggerConfig,
    sink: Option<Arc<dyn SlotSink>>,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RefreshScheduler {
    pub fn new(service: Arc<SchedulerService>, config: TriggerConfig) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        Self {
            service,
            config,
            sink: None,
            shutdown,
            shutdown_rx,
        }
    }

    /// Push the active plan to `sink` whenever its plan or merged slots change
    pub fn with_sink(mut self, sink: Arc<dyn SlotSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start all background tasks
    pub fn start(self) -> SchedulerHandle {
        let mut handles = vec![
            self.spawn_periodic_refresh(),
            self.spawn_daily_refresh(),
            self.spawn_live_check(),
        ];
        if let Some(sink) = self.sink.clone() {
            handles.push(self.spawn_sink_applier(sink));
        }

        tracing::info!(tasks = handles.len(), "Refresh scheduler started");

        SchedulerHandle {
            handles,
            shutdown: self.shutdown,
        }
    }

    fn spawn_periodic_refresh(&self) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            if config.refresh_on_startup {
                let _ = service.refresh(RefreshKind::Startup).await;
            }

            loop {
                let delay = config.periodic_refresh_delay(Utc::now(), service.is_live().await);
                tracing::debug!(delay_secs = delay.as_secs(), "Next periodic refresh scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        let _ = service.refresh(RefreshKind::Scheduled).await;
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }

            tracing::info!("Periodic refresh task shutting down");
        })
    }

    fn spawn_daily_refresh(&self) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            loop {
                let delay = config.duration_until_daily_refresh(Utc::now());
                tracing::debug!(delay_secs = delay.as_secs(), "Next daily refresh scheduled");

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                        let _ = service.refresh(RefreshKind::Daily).await;
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }

            tracing::info!("Daily refresh task shutting down");
        })
    }

    fn spawn_live_check(&self) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let interval = self.config.live_check_interval;
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let live = service.evaluate_live().await;
                        tracing::debug!(live_plan = ?live, "Live status evaluated");
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }

            tracing::info!("Live check task shutting down");
        })
    }

    fn spawn_sink_applier(&self, sink: Arc<dyn SlotSink>) -> JoinHandle<()> {
        let service = Arc::clone(&self.service);
        let mut events = service.subscribe();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            // Plan id and merged slots last written to the sink
            let mut applied: Option<(String, SlotAssignments)> = None;

            loop {
                let lagged = tokio::select! {
                    event = events.recv() => match event {
                        Ok(_) => false,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "Scheduler events dropped, reapplying active plan");
                            true
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                };

                let Some(active) = service.get_active_plan().await else {
                    applied = None;
                    continue;
                };
                let snapshot = (active.plan.plan_id.clone(), active.plan.slot_assignments.clone());
                if lagged || applied.as_ref() != Some(&snapshot) {
                    service.apply_plan(&active, sink.as_ref());
                    applied = Some(snapshot);
                }
            }

            tracing::info!("Slot applier task shutting down");
        })
    }
}

// ============================================================================
// Scheduler Handle
// ============================================================================

/// Handle to the running refresh tasks
pub struct SchedulerHandle {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl SchedulerHandle {
    /// Wait for all tasks to complete
    pub async fn wait(self) {
        for result in futures::future::join_all(self.handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Scheduler task failed");
            }
        }
    }

    /// Signal shutdown and wait for the tasks to stop
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.wait().await;
        tracing::info!("Refresh scheduler stopped");
    }

    /// Check if every task is still running
    pub fn is_running(&self) -> bool {
        self.handles.iter().all(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, s).unwrap()
    }

    fn config() -> TriggerConfig {
        TriggerConfig {
            day_boundary: DayBoundary::utc(),
            ..TriggerConfig::default()
        }
    }

    #[test]
    fn test_daily_refresh_just_after_midnight() {
        let config = config();

        assert_eq!(
            config.duration_until_daily_refresh(utc(23, 0, 0)),
            Duration::from_secs(3601)
        );
        assert_eq!(
            config.duration_until_daily_refresh(utc(0, 0, 0)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_periodic_delay_while_live() {
        let config = config();
        assert_eq!(config.periodic_refresh_delay(utc(10, 0, 0), true), Duration::from_secs(300));
    }

    #[test]
    fn test_periodic_delay_idle_is_bounded() {
        let config = config();

        // Far from midnight: capped at 30 minutes
        assert_eq!(config.periodic_refresh_delay(utc(10, 0, 0), false), Duration::from_secs(1800));
        // Ten minutes before 00:01
        assert_eq!(config.periodic_refresh_delay(utc(23, 51, 0), false), Duration::from_secs(600));
        // Just before 00:01: at least a minute
        assert_eq!(config.periodic_refresh_delay(utc(0, 0, 50), false), Duration::from_secs(60));
    }

    #[test]
    fn test_trigger_config_from_scheduler_config() {
        let scheduler = SchedulerConfig {
            live_check_interval_secs: 30,
            refresh_on_startup: false,
            ..SchedulerConfig::default()
        };
        let config = TriggerConfig::from(&scheduler);

        assert_eq!(config.live_check_interval, Duration::from_secs(30));
        assert!(!config.refresh_on_startup);
    }
}
