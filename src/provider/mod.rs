//! Scheduling provider access
//!
//! The [`PlanSource`] trait is the seam between the schedule cache and the
//! remote provider. [`ProviderClient`] is the rate-limited HTTP
//! implementation; tests substitute in-memory sources.

pub mod client;
pub mod limiter;
pub mod wire;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Assignment, ServiceTime};
use crate::utils::error::FetchError;

pub use client::ProviderClient;
pub use limiter::RequestLimiter;

/// Result type for provider operations
pub type FetchResult<T> = Result<T, FetchError>;

/// A future plan as listed by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlan {
    pub id: String,
    pub title: String,
    pub dates: String,
}

/// A team or team position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub id: String,
    pub name: String,
}

/// Read access to the provider's plans and team metadata
///
/// A "not found" answer from the provider is reported as an empty list.
#[async_trait]
pub trait PlanSource: Send + Sync {
    /// Nearest future plans of a group, ordered by date
    async fn future_plans(&self, group_id: &str, limit: u32) -> FetchResult<Vec<RemotePlan>>;

    /// Service times of a plan
    async fn plan_times(&self, group_id: &str, plan_id: &str) -> FetchResult<Vec<ServiceTime>>;

    /// People assigned to positions in a plan
    async fn plan_assignments(&self, group_id: &str, plan_id: &str)
        -> FetchResult<Vec<Assignment>>;

    /// Teams of a group
    async fn teams(&self, group_id: &str) -> FetchResult<Vec<NamedResource>>;

    /// Positions of one team in a group
    async fn team_positions(
        &self,
        group_id: &str,
        team_id: &str,
    ) -> FetchResult<Vec<NamedResource>>;
}
