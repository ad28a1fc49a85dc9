//! Schedule Cache
//!
//! Per group, the nearest future plans with their live windows and mapped slot
//! assignments. Plan details (service times and assignments) are kept by plan
//! id across refreshes so assignments are fetched only once per plan.
//!
//! A refresh replaces each group's plan list wholesale. A group whose plan
//! list cannot be fetched keeps its previous entry; a plan whose service times
//! cannot be fetched is left out of the new list.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::window::{window_start, DayBoundary};
use crate::mapping::{referenced_teams, PositionCatalog, SlotMappingEngine};
use crate::metrics;
use crate::models::{Assignment, Plan, PlanDetail, ScheduleGroup, SlotMappingRule};
use crate::provider::{PlanSource, RemotePlan};

/// Cache tuning
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    /// Future plans fetched per group
    pub plans_per_group: u32,

    /// Highest slot reachable through the `mic N` pattern
    pub max_pattern_slot: u32,

    /// Timezone of the service day
    pub day_boundary: DayBoundary,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            plans_per_group: 2,
            max_pattern_slot: 32,
            day_boundary: DayBoundary::Local,
        }
    }
}

/// Outcome of one refresh cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Groups whose plan list was replaced
    pub refreshed_groups: Vec<String>,

    /// Groups that kept their previous plan list
    pub failed_groups: Vec<String>,

    /// Plans left out because their service times were unavailable
    pub skipped_plans: usize,

    /// Plans cached across all groups after the refresh
    pub total_plans: usize,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed_groups.is_empty()
    }
}

#[derive(Debug, Default)]
struct CacheState {
    schedules: HashMap<String, Vec<Plan>>,
    details: HashMap<String, PlanDetail>,
    catalog: PositionCatalog,
    generated_at: Option<DateTime<Utc>>,
}

/// A plan fetched in this cycle, before its window is known
struct FetchedPlan {
    remote: RemotePlan,
    earliest: DateTime<Utc>,
    assignments: Vec<Assignment>,
}

pub struct ScheduleCache {
    source: Arc<dyn PlanSource>,
    settings: CacheSettings,
    state: RwLock<CacheState>,

    /// Serializes refresh cycles; never held by readers
    refresh_lock: Mutex<()>,
}

impl ScheduleCache {
    pub fn new(source: Arc<dyn PlanSource>, settings: CacheSettings) -> Self {
        Self {
            source,
            settings,
            state: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Refetch every group's plans
    ///
    /// With `force`, cached plan details and team metadata are dropped first
    /// so assignments are fetched again. Groups no longer in `groups` are
    /// removed from the cache.
    pub async fn refresh(
        &self,
        groups: &[ScheduleGroup],
        global_rules: &[SlotMappingRule],
        force: bool,
    ) -> RefreshReport {
        self.refresh_scoped(groups, global_rules, None, force).await
    }

    /// Refetch only the groups listed in `group_ids`
    ///
    /// `groups` is still the full configuration: global rules are built from
    /// every group's name rules.
    pub async fn refresh_groups(
        &self,
        groups: &[ScheduleGroup],
        global_rules: &[SlotMappingRule],
        group_ids: &[String],
        force: bool,
    ) -> RefreshReport {
        self.refresh_scoped(groups, global_rules, Some(group_ids), force)
            .await
    }

    async fn refresh_scoped(
        &self,
        groups: &[ScheduleGroup],
        global_rules: &[SlotMappingRule],
        targets: Option<&[String]>,
        force: bool,
    ) -> RefreshReport {
        let _cycle = self.refresh_lock.lock().await;

        let selected: Vec<&ScheduleGroup> = groups
            .iter()
            .filter(|g| targets.map_or(true, |ids| ids.contains(&g.id)))
            .collect();

        if force {
            match targets {
                None => self.clear_plan_details().await,
                Some(ids) => {
                    let mut state = self.state.write().await;
                    state.details.retain(|_, detail| !ids.contains(&detail.group_id));
                    for id in ids {
                        state.catalog.clear_group(id);
                    }
                }
            }
            tracing::info!(groups = selected.len(), "Cleared cached plan details for forced refresh");
        }

        self.resolve_id_rules(&selected).await;

        let engine = {
            let state = self.state.read().await;
            SlotMappingEngine::build(
                groups,
                global_rules,
                self.settings.max_pattern_slot,
                &state.catalog,
            )
        };

        let mut report = RefreshReport::default();

        for group in selected {
            match self.fetch_group(group, &engine).await {
                Some((plans, skipped)) => {
                    tracing::info!(
                        group_id = %group.id,
                        group = group.display_name(),
                        plans = plans.len(),
                        skipped,
                        "Group schedule refreshed"
                    );
                    report.skipped_plans += skipped;
                    report.refreshed_groups.push(group.id.clone());
                    self.state.write().await.schedules.insert(group.id.clone(), plans);
                }
                None => {
                    metrics::record_group_failure(&group.id);
                    report.failed_groups.push(group.id.clone());
                }
            }
        }

        let mut state = self.state.write().await;
        state
            .schedules
            .retain(|group_id, _| groups.iter().any(|g| &g.id == group_id));
        state.generated_at = Some(Utc::now());
        report.total_plans = state.schedules.values().map(Vec::len).sum();

        report
    }

    /// Fetch team positions referenced by ID rules, cache first
    async fn resolve_id_rules(&self, groups: &[&ScheduleGroup]) {
        for group in groups.iter().filter(|g| g.has_id_rules()) {
            for team_id in referenced_teams(group) {
                if self.state.read().await.catalog.has_team(&group.id, team_id) {
                    continue;
                }

                match self.source.team_positions(&group.id, team_id).await {
                    Ok(positions) => {
                        tracing::debug!(
                            group_id = %group.id,
                            team_id,
                            positions = positions.len(),
                            "Fetched team positions"
                        );
                        self.state
                            .write()
                            .await
                            .catalog
                            .insert_team(&group.id, team_id, positions);
                    }
                    Err(e) => {
                        tracing::warn!(
                            group_id = %group.id,
                            team_id,
                            error = %e,
                            "Could not fetch team positions; ID rules for this team stay unresolved"
                        );
                    }
                }
            }
        }
    }

    /// Build a group's new plan list; `None` if its plan list is unavailable
    async fn fetch_group(
        &self,
        group: &ScheduleGroup,
        engine: &SlotMappingEngine,
    ) -> Option<(Vec<Plan>, usize)> {
        let remote_plans = match self
            .source
            .future_plans(&group.id, self.settings.plans_per_group)
            .await
        {
            Ok(plans) => plans,
            Err(e) => {
                tracing::warn!(
                    group_id = %group.id,
                    error = %e,
                    "Could not fetch future plans; keeping previous schedule"
                );
                return None;
            }
        };

        let mut fetched = Vec::with_capacity(remote_plans.len());
        let mut skipped = 0;

        for remote in remote_plans {
            match self.fetch_plan(group, remote).await {
                Some(plan) if window_start(plan.earliest, group.lead_time_hours).is_none() => {
                    tracing::warn!(
                        group_id = %group.id,
                        plan_id = %plan.remote.id,
                        lead_time_hours = group.lead_time_hours,
                        "Live window start out of range, skipping plan"
                    );
                    skipped += 1;
                }
                Some(plan) => fetched.push(plan),
                None => skipped += 1,
            }
        }

        fetched.sort_by_key(|plan| plan.earliest);
        let starts: Vec<_> = fetched.iter().map(|plan| plan.earliest).collect();
        let windows = self
            .settings
            .day_boundary
            .compute_windows(&starts, group.lead_time_hours);

        let plans = fetched
            .into_iter()
            .zip(windows)
            .map(|(fetched, window)| Plan {
                slot_assignments: engine.map_assignments(&fetched.assignments, &group.id),
                plan_id: fetched.remote.id,
                group_id: group.id.clone(),
                group_name: group.display_name().to_string(),
                title: fetched.remote.title,
                date_label: fetched.remote.dates,
                earliest_service_time: fetched.earliest,
                live_window_start: window.start,
                live_window_end: window.end,
            })
            .collect();

        Some((plans, skipped))
    }

    async fn fetch_plan(&self, group: &ScheduleGroup, remote: RemotePlan) -> Option<FetchedPlan> {
        let service_times = match self.source.plan_times(&group.id, &remote.id).await {
            Ok(times) if !times.is_empty() => times,
            Ok(_) => {
                tracing::info!(group_id = %group.id, plan_id = %remote.id, "Plan has no service times, skipping");
                return None;
            }
            Err(e) => {
                tracing::warn!(
                    group_id = %group.id,
                    plan_id = %remote.id,
                    error = %e,
                    "Could not fetch service times, skipping plan"
                );
                return None;
            }
        };

        let cached = {
            let mut state = self.state.write().await;
            state.details.get_mut(&remote.id).map(|detail| {
                detail.service_times = service_times.clone();
                detail.assignments.clone()
            })
        };

        let assignments = match cached {
            Some(assignments) => assignments,
            None => match self.source.plan_assignments(&group.id, &remote.id).await {
                Ok(assignments) => {
                    let detail = PlanDetail {
                        plan_id: remote.id.clone(),
                        group_id: group.id.clone(),
                        service_times: service_times.clone(),
                        assignments: assignments.clone(),
                        fetched_at: Utc::now(),
                    };
                    tracing::debug!(
                        plan_id = %remote.id,
                        assignments = assignments.len(),
                        "Cached plan detail"
                    );
                    self.state.write().await.details.insert(remote.id.clone(), detail);
                    assignments
                }
                Err(e) => {
                    tracing::warn!(
                        group_id = %group.id,
                        plan_id = %remote.id,
                        error = %e,
                        "Could not fetch assignments; plan kept without slot assignments"
                    );
                    Vec::new()
                }
            },
        };

        let earliest = service_times.iter().map(|t| t.starts_at).min()?;

        Some(FetchedPlan {
            remote,
            earliest,
            assignments,
        })
    }

    /// Plans of one group, ordered by earliest service time
    pub async fn get_daily_schedule(&self, group_id: &str) -> Vec<Plan> {
        self.state
            .read()
            .await
            .schedules
            .get(group_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Plans of every group
    pub async fn all_plans(&self) -> Vec<Plan> {
        self.state
            .read()
            .await
            .schedules
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    pub async fn get_plan_detail(&self, plan_id: &str) -> Option<PlanDetail> {
        self.state.read().await.details.get(plan_id).cloned()
    }

    /// Drop cached plan details and team metadata
    pub async fn clear_plan_details(&self) {
        let mut state = self.state.write().await;
        state.details.clear();
        state.catalog.clear();
    }

    /// Drop every group's plan list along with cached details
    pub async fn clear(&self) {
        let _cycle = self.refresh_lock.lock().await;
        self.clear_plan_details().await;
        let mut state = self.state.write().await;
        state.schedules.clear();
        state.generated_at = Some(Utc::now());
    }

    /// When the last refresh finished
    pub async fn generated_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.generated_at
    }

    pub async fn group_count(&self) -> usize {
        self.state.read().await.schedules.len()
    }
}

impl std::fmt::Debug for ScheduleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleCache")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
