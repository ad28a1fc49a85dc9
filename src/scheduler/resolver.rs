//! Live-Plan Resolver
//!
//! Holds the upcoming plans, the scheduled-live plan and the operator's manual
//! selection behind one lock. The live plan always wins over the manual one,
//! and a manual selection is refused while a plan is live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::error::{SchedulerError, SchedulerResult};
use crate::models::Plan;

/// Why a plan is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveSource {
    Live,
    Manual,
}

/// Shared scheduling state
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// Plans of every group, ordered by live window start
    pub upcoming: Vec<Plan>,

    /// Plan whose live window contains the last evaluation time
    pub current_live: Option<Plan>,

    /// Plan chosen by an operator while nothing was live
    pub manual: Option<Plan>,
}

impl SchedulerState {
    /// Live plan if any, else the manual one
    pub fn active(&self) -> Option<(&Plan, ActiveSource)> {
        self.current_live
            .as_ref()
            .map(|plan| (plan, ActiveSource::Live))
            .or_else(|| self.manual.as_ref().map(|plan| (plan, ActiveSource::Manual)))
    }

    fn evaluate(&mut self, now: DateTime<Utc>) -> LiveTransition {
        let previous = self.current_live.as_ref().map(|p| p.plan_id.clone());
        self.current_live = self.upcoming.iter().find(|plan| plan.is_live_at(now)).cloned();
        LiveTransition {
            previous,
            current: self.current_live.as_ref().map(|p| p.plan_id.clone()),
        }
    }
}

/// Result of a live evaluation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiveTransition {
    pub previous: Option<String>,
    pub current: Option<String>,
}

impl LiveTransition {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

#[derive(Debug, Default)]
pub struct LivePlanResolver {
    state: Mutex<SchedulerState>,
}

impl LivePlanResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a freshly computed plan list and re-evaluate live status
    ///
    /// A manual selection follows its plan into the new list, or is dropped
    /// when the plan is no longer upcoming.
    pub async fn apply_refresh(&self, mut plans: Vec<Plan>, now: DateTime<Utc>) -> LiveTransition {
        plans.sort_by(|a, b| {
            a.live_window_start
                .cmp(&b.live_window_start)
                .then_with(|| a.group_id.cmp(&b.group_id))
        });

        let mut state = self.state.lock().await;
        state.upcoming = plans;

        if let Some(manual_id) = state.manual.as_ref().map(|p| p.plan_id.clone()) {
            let refreshed = state.upcoming.iter().find(|p| p.plan_id == manual_id).cloned();
            if refreshed.is_none() {
                tracing::info!(plan_id = %manual_id, "Manual plan no longer upcoming, clearing selection");
            }
            state.manual = refreshed;
        }

        state.evaluate(now)
    }

    /// Re-run live detection against the current plan list
    pub async fn evaluate_live(&self, now: DateTime<Utc>) -> LiveTransition {
        self.state.lock().await.evaluate(now)
    }

    /// Select a plan manually
    ///
    /// # Errors
    ///
    /// - `SchedulerError::Conflict` while a scheduled plan is live
    /// - `SchedulerError::PlanNotFound` if the plan is not upcoming
    pub async fn set_manual(&self, plan_id: &str) -> SchedulerResult<Plan> {
        let mut state = self.state.lock().await;

        if let Some(live) = &state.current_live {
            return Err(SchedulerError::conflict(&live.plan_id));
        }

        let plan = state
            .upcoming
            .iter()
            .find(|p| p.plan_id == plan_id)
            .cloned()
            .ok_or_else(|| SchedulerError::plan_not_found(plan_id))?;

        state.manual = Some(plan.clone());
        Ok(plan)
    }

    /// Drop the manual selection, returning it
    pub async fn clear_manual(&self) -> Option<Plan> {
        self.state.lock().await.manual.take()
    }

    pub async fn active_plan(&self) -> Option<(Plan, ActiveSource)> {
        self.state
            .lock()
            .await
            .active()
            .map(|(plan, source)| (plan.clone(), source))
    }

    pub async fn snapshot(&self) -> SchedulerState {
        self.state.lock().await.clone()
    }

    pub async fn is_live(&self) -> bool {
        self.state.lock().await.current_live.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SlotAssignments;
    use chrono::{Duration, TimeZone};

    fn plan(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Plan {
        Plan {
            plan_id: id.to_string(),
            group_id: "g".to_string(),
            group_name: "Sunday".to_string(),
            title: id.to_string(),
            date_label: String::new(),
            earliest_service_time: start + Duration::hours(2),
            live_window_start: start,
            live_window_end: end,
            slot_assignments: SlotAssignments::new(),
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_live_plan_found_after_refresh() {
        let resolver = LivePlanResolver::new();
        let plans = vec![plan("late", at(16), at(23)), plan("early", at(7), at(16))];

        let transition = resolver.apply_refresh(plans, at(9)).await;

        assert!(transition.changed());
        assert_eq!(transition.current.as_deref(), Some("early"));
        let snapshot = resolver.snapshot().await;
        assert_eq!(snapshot.upcoming[0].plan_id, "early");
    }

    #[tokio::test]
    async fn test_boundary_instant_belongs_to_next_plan() {
        let resolver = LivePlanResolver::new();
        let plans = vec![plan("early", at(7), at(16)), plan("late", at(16), at(23))];

        let transition = resolver.apply_refresh(plans, at(16)).await;

        assert_eq!(transition.current.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_manual_rejected_while_live() {
        let resolver = LivePlanResolver::new();
        resolver.apply_refresh(vec![plan("p1", at(7), at(16)), plan("p2", at(18), at(23))], at(9)).await;

        let result = resolver.set_manual("p2").await;
        assert_eq!(result, Err(SchedulerError::conflict("p1")));
        assert!(resolver.snapshot().await.manual.is_none());
    }

    #[tokio::test]
    async fn test_manual_selection_between_plans() {
        let resolver = LivePlanResolver::new();
        resolver.apply_refresh(vec![plan("p1", at(7), at(12)), plan("p2", at(18), at(23))], at(14)).await;

        assert_eq!(
            resolver.set_manual("missing").await,
            Err(SchedulerError::plan_not_found("missing"))
        );

        resolver.set_manual("p2").await.unwrap();
        let (active, source) = resolver.active_plan().await.unwrap();
        assert_eq!(active.plan_id, "p2");
        assert_eq!(source, ActiveSource::Manual);

        // p1 goes live again: the live plan reclaims precedence
        resolver.apply_refresh(vec![plan("p1", at(7), at(16)), plan("p2", at(18), at(23))], at(15)).await;
        let (active, source) = resolver.active_plan().await.unwrap();
        assert_eq!(active.plan_id, "p1");
        assert_eq!(source, ActiveSource::Live);

        // The manual choice survives and returns once nothing is live
        resolver.evaluate_live(at(17)).await;
        let (active, _) = resolver.active_plan().await.unwrap();
        assert_eq!(active.plan_id, "p2");
    }

    #[tokio::test]
    async fn test_manual_dropped_when_plan_disappears() {
        let resolver = LivePlanResolver::new();
        resolver.apply_refresh(vec![plan("p1", at(18), at(23))], at(9)).await;
        resolver.set_manual("p1").await.unwrap();

        resolver.apply_refresh(vec![plan("p2", at(18), at(23))], at(9)).await;

        assert!(resolver.active_plan().await.is_none());
        assert!(resolver.clear_manual().await.is_none());
    }
}
