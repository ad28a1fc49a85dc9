//! slotroster - live schedule to hardware slot mapping
//!
//! Polls a planning provider for upcoming plans, works out which plan is live
//! and maps the people scheduled on it onto numbered slots.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`provider`] - Rate-limited provider client and response decoding
//! - [`mapping`] - Position name to slot resolution
//! - [`scheduler`] - Schedule cache, live-plan resolution and refresh tasks
//! - [`models`] - Core data structures and types
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use slotroster::config::Config;
//! use slotroster::scheduler::{RefreshKind, SchedulerService};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let service = SchedulerService::from_config(&config)?;
//!     service.refresh(RefreshKind::Startup).await?;
//!     if let Some(active) = service.get_active_plan().await {
//!         println!("{:?}", active.plan.slot_assignments);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod mapping;
pub mod metrics;
pub mod models;
pub mod provider;
pub mod scheduler;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result, RosterErrorTrait};
    pub use crate::models::{Plan, ScheduleGroup, SlotAssignments, SlotMappingRule};
    pub use crate::provider::{PlanSource, ProviderClient};
    pub use crate::scheduler::{RefreshScheduler, SchedulerService, SlotSink};
}

// Direct re-exports for convenience
pub use models::{Plan, ScheduleGroup, SlotAssignments, SlotMappingRule};
