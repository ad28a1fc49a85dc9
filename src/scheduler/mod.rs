//! Schedule polling and live-plan tracking
//!
//! # Overview
//!
//! Each configured group (a provider service type) is polled for its nearest
//! future plans. Every plan gets a live window that opens `lead_time_hours`
//! before its earliest service time and closes at the end of that service
//! day, or when the group's next plan opens, whichever comes first. The plan
//! whose window contains "now" is the live plan; its mapped slot assignments
//! are what the slots show.
//!
//! # Architecture
//!
//! ```text
//!   RefreshScheduler ──► SchedulerService ──► ScheduleCache ──► PlanSource
//!   (daily / periodic       │    │                 │
//!    / live-check tasks)    │    │                 └─► SlotMappingEngine
//!                           │    └─► SlotOverrideStore
//!                           └─► LivePlanResolver
//! ```
//!
//! # Modules
//!
//! - [`window`] - Live window computation and day boundaries
//! - [`cache`] - Per-group plan lists and per-plan detail cache
//! - [`resolver`] - Live and manual plan selection
//! - [`overrides`] - Operator slot overrides per plan
//! - [`service`] - Public scheduler operations and events
//! - [`trigger`] - Background refresh tasks
//! - [`error`] - Scheduler error types
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use slotroster::config::Config;
//! use slotroster::scheduler::{RefreshScheduler, SchedulerService, TriggerConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let service = Arc::new(SchedulerService::from_config(&config)?);
//!
//! let handle = RefreshScheduler::new(Arc::clone(&service), TriggerConfig::from(&config.scheduler))
//!     .with_sink(Arc::new(|slot: u32, name: &str| println!("slot {slot}: {name}")))
//!     .start();
//!
//! // ... later
//! handle.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod error;
pub mod overrides;
pub mod resolver;
pub mod service;
pub mod trigger;
pub mod window;

pub use cache::{CacheSettings, RefreshReport, ScheduleCache};
pub use error::{SchedulerError, SchedulerResult};
pub use overrides::SlotOverrideStore;
pub use resolver::{ActiveSource, LivePlanResolver, LiveTransition, SchedulerState};
pub use service::{
    ActivePlan, PlanView, RefreshKind, SchedulerEvent, SchedulerService, SchedulerStatus,
    SlotSink,
};
pub use trigger::{RefreshScheduler, SchedulerHandle, TriggerConfig};
pub use window::{compute_windows, DayBoundary, LiveWindow};
