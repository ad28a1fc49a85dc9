//! Scheduler service
//!
//! Owns the schedule cache, the live-plan resolver and the slot override
//! store, and exposes the operations used by the web and device layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use super::cache::{CacheSettings, RefreshReport, ScheduleCache};
use super::error::{SchedulerError, SchedulerResult};
use super::overrides::SlotOverrideStore;
use super::resolver::{ActiveSource, LivePlanResolver};
use crate::config::{validate_groups, Config};
use crate::metrics;
use crate::models::{Plan, PlanDetail, ScheduleGroup, SlotAssignments, SlotMappingRule};
use crate::provider::{PlanSource, ProviderClient};
use crate::utils::error::FetchError;

/// Receives resolved slot names; an empty name clears the slot
pub trait SlotSink: Send + Sync {
    fn apply_slot(&self, slot: u32, name: &str);
}

impl<F> SlotSink for F
where
    F: Fn(u32, &str) + Send + Sync,
{
    fn apply_slot(&self, slot: u32, name: &str) {
        self(slot, name)
    }
}

/// Events emitted by the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// The scheduled-live plan changed
    LivePlanChanged {
        previous: Option<String>,
        current: Option<String>,
    },

    /// A refresh cycle finished
    RefreshCompleted {
        kind: RefreshKind,
        refreshed_groups: usize,
        failed_groups: usize,
        plans: usize,
    },

    /// The manual selection was set or cleared
    ManualPlanChanged { plan_id: Option<String> },

    /// A plan's slot overrides were set or cleared
    SlotOverridesChanged { plan_id: String },
}

/// What started a refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshKind {
    Startup,
    Daily,
    Scheduled,
    Forced,
}

impl RefreshKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Daily => "daily",
            Self::Scheduled => "scheduled",
            Self::Forced => "forced",
        }
    }

    /// Whether cached plan details are dropped before fetching
    pub fn clears_details(&self) -> bool {
        !matches!(self, Self::Scheduled)
    }
}

/// An upcoming plan as listed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: Plan,

    pub is_live: bool,
    pub is_manual: bool,
}

/// The active plan with overrides applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivePlan {
    #[serde(flatten)]
    pub plan: Plan,

    pub source: ActiveSource,
}

/// Scheduler summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub configured: bool,
    pub group_count: usize,
    pub plan_count: usize,
    pub live_plan_id: Option<String>,
    pub manual_plan_id: Option<String>,
    pub last_refresh: Option<DateTime<Utc>>,
}

impl SchedulerStatus {
    /// Format as display string
    pub fn display(&self) -> String {
        format!(
            "Scheduler: {}\n  Groups: {}\n  Plans: {}\n  Live plan: {}\n  Manual plan: {}\n  Last refresh: {}",
            if self.configured { "configured" } else { "not configured" },
            self.group_count,
            self.plan_count,
            self.live_plan_id.as_deref().unwrap_or("-"),
            self.manual_plan_id.as_deref().unwrap_or("-"),
            self.last_refresh
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string())
        )
    }
}

#[derive(Debug, Clone, Default)]
struct GroupConfig {
    groups: Vec<ScheduleGroup>,
    global_rules: Vec<SlotMappingRule>,
}

pub struct SchedulerService {
    cache: ScheduleCache,
    resolver: LivePlanResolver,
    overrides: SlotOverrideStore,
    groups: RwLock<GroupConfig>,
    slot_count: u32,
    missing_credentials: bool,
    event_sender: broadcast::Sender<SchedulerEvent>,
}

impl SchedulerService {
    /// Create a service over any plan source
    pub fn new(source: Arc<dyn PlanSource>, config: &Config) -> Self {
        let settings = CacheSettings {
            plans_per_group: config.scheduler.plans_per_group,
            max_pattern_slot: config.scheduler.max_pattern_slot,
            day_boundary: config.scheduler.day_boundary(),
        };
        let (event_sender, _) = broadcast::channel(100);

        Self {
            cache: ScheduleCache::new(source, settings),
            resolver: LivePlanResolver::new(),
            overrides: SlotOverrideStore::new(),
            groups: RwLock::new(GroupConfig {
                groups: config.groups.clone(),
                global_rules: config.global_rules.clone(),
            }),
            slot_count: config.scheduler.slot_count,
            missing_credentials: false,
            event_sender,
        }
    }

    /// Create a service talking to the provider described by `config`
    ///
    /// Missing credentials do not fail construction: the service reports a
    /// configuration error on every refresh and stays idle.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let client = ProviderClient::new(&config.provider)?;
        let mut service = Self::new(Arc::new(client), config);
        service.missing_credentials = config.provider.credentials().is_none();
        Ok(service)
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_sender.subscribe()
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    fn emit(&self, event: SchedulerEvent) {
        // No subscribers is fine
        let _ = self.event_sender.send(event);
    }

    /// Fail with a configuration error when refreshing cannot work
    pub async fn check_configuration(&self) -> SchedulerResult<()> {
        if self.missing_credentials {
            return Err(SchedulerError::configuration("provider credentials are not set"));
        }
        if self.groups.read().await.groups.is_empty() {
            return Err(SchedulerError::configuration("no schedule groups configured"));
        }
        Ok(())
    }

    /// Refresh every configured group, then re-evaluate live status
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Configuration` without contacting the
    /// provider when credentials or groups are missing. Provider failures are
    /// not errors: they show up in the report's failed groups.
    pub async fn refresh(&self, kind: RefreshKind) -> SchedulerResult<RefreshReport> {
        self.run_refresh(kind, None).await
    }

    /// Refresh with cached plan details dropped first
    pub async fn force_refresh(&self) -> SchedulerResult<RefreshReport> {
        self.run_refresh(RefreshKind::Forced, None).await
    }

    /// Forced refresh of the given groups only; other groups keep their plans
    pub async fn force_refresh_groups(&self, group_ids: &[String]) -> SchedulerResult<RefreshReport> {
        self.run_refresh(RefreshKind::Forced, Some(group_ids)).await
    }

    async fn run_refresh(
        &self,
        kind: RefreshKind,
        targets: Option<&[String]>,
    ) -> SchedulerResult<RefreshReport> {
        if let Err(e) = self.check_configuration().await {
            tracing::warn!(kind = kind.as_str(), error = %e, "Skipping refresh");
            return Err(e);
        }

        let GroupConfig {
            groups,
            global_rules,
        } = self.groups.read().await.clone();

        let _timer = metrics::start_refresh_timer(kind.as_str());
        tracing::info!(kind = kind.as_str(), groups = groups.len(), "Refreshing schedule");

        let force = kind.clears_details();
        let report = match targets {
            Some(ids) => {
                self.cache
                    .refresh_groups(&groups, &global_rules, ids, force)
                    .await
            }
            None => self.cache.refresh(&groups, &global_rules, force).await,
        };

        let transition = self
            .resolver
            .apply_refresh(self.cache.all_plans().await, Utc::now())
            .await;

        metrics::record_refresh_cycle(kind.as_str());
        tracing::info!(
            kind = kind.as_str(),
            refreshed = report.refreshed_groups.len(),
            failed = report.failed_groups.len(),
            plans = report.total_plans,
            "Schedule refreshed"
        );

        self.emit(SchedulerEvent::RefreshCompleted {
            kind,
            refreshed_groups: report.refreshed_groups.len(),
            failed_groups: report.failed_groups.len(),
            plans: report.total_plans,
        });
        self.publish_transition(transition.previous, transition.current);

        Ok(report)
    }

    /// Re-evaluate live status without contacting the provider
    pub async fn evaluate_live(&self) -> Option<String> {
        let transition = self.resolver.evaluate_live(Utc::now()).await;
        let current = transition.current.clone();
        self.publish_transition(transition.previous, transition.current);
        current
    }

    fn publish_transition(&self, previous: Option<String>, current: Option<String>) {
        metrics::set_live_plan_active(current.is_some());
        if previous == current {
            return;
        }

        match &current {
            Some(plan_id) => tracing::info!(plan_id = %plan_id, "Plan is now live"),
            None => tracing::info!(previous = ?previous, "No plan is live"),
        }
        self.emit(SchedulerEvent::LivePlanChanged { previous, current });
    }

    /// Replace group definitions and rebuild the cache
    ///
    /// # Errors
    ///
    /// `SchedulerError::Configuration` when the new groups are invalid (the
    /// previous configuration stays) or when refreshing cannot work, in which
    /// case the cache and live state are emptied.
    pub async fn reconfigure(
        &self,
        groups: Vec<ScheduleGroup>,
        global_rules: Vec<SlotMappingRule>,
    ) -> SchedulerResult<RefreshReport> {
        if let Err(e) = validate_groups(&groups, &global_rules) {
            tracing::warn!(error = %format!("{e:#}"), "Rejected group configuration");
            return Err(SchedulerError::configuration(format!("{e:#}")));
        }

        {
            let mut config = self.groups.write().await;
            tracing::info!(
                previous = config.groups.len(),
                groups = groups.len(),
                "Reconfiguring schedule groups"
            );
            config.groups = groups;
            config.global_rules = global_rules;
        }

        if let Err(e) = self.check_configuration().await {
            tracing::warn!(error = %e, "Nothing to refresh after reconfiguration, clearing schedule");
            self.cache.clear().await;
            let transition = self.resolver.apply_refresh(Vec::new(), Utc::now()).await;
            self.publish_transition(transition.previous, transition.current);
            return Err(e);
        }

        self.force_refresh().await
    }

    pub async fn groups(&self) -> Vec<ScheduleGroup> {
        self.groups.read().await.groups.clone()
    }

    /// Upcoming plans of every group, with overrides merged in
    pub async fn list_upcoming_plans(&self) -> Vec<PlanView> {
        let state = self.resolver.snapshot().await;
        let live_id = state.current_live.as_ref().map(|p| p.plan_id.as_str());
        let manual_id = state.manual.as_ref().map(|p| p.plan_id.as_str());

        let mut views = Vec::with_capacity(state.upcoming.len());
        for plan in &state.upcoming {
            let mut plan = plan.clone();
            plan.slot_assignments = self
                .overrides
                .merged(&plan.plan_id, &plan.slot_assignments)
                .await;
            views.push(PlanView {
                is_live: live_id == Some(plan.plan_id.as_str()),
                is_manual: manual_id == Some(plan.plan_id.as_str()),
                plan,
            });
        }
        views
    }

    /// Plans of one group as cached
    pub async fn get_daily_schedule(&self, group_id: &str) -> Vec<Plan> {
        self.cache.get_daily_schedule(group_id).await
    }

    pub async fn get_plan_detail(&self, plan_id: &str) -> Option<PlanDetail> {
        self.cache.get_plan_detail(plan_id).await
    }

    /// The live plan, else the manual one, with overrides merged in
    pub async fn get_active_plan(&self) -> Option<ActivePlan> {
        let (mut plan, source) = self.resolver.active_plan().await?;
        plan.slot_assignments = self
            .overrides
            .merged(&plan.plan_id, &plan.slot_assignments)
            .await;
        Some(ActivePlan { plan, source })
    }

    /// Select a plan manually
    ///
    /// # Errors
    ///
    /// `SchedulerError::Conflict` while a scheduled plan is live,
    /// `SchedulerError::PlanNotFound` for an unknown plan id
    pub async fn set_manual_plan(&self, plan_id: &str) -> SchedulerResult<Plan> {
        match self.resolver.set_manual(plan_id).await {
            Ok(plan) => {
                tracing::info!(plan_id, "Manual plan set");
                self.emit(SchedulerEvent::ManualPlanChanged {
                    plan_id: Some(plan.plan_id.clone()),
                });
                Ok(plan)
            }
            Err(e) => {
                tracing::warn!(plan_id, error = %e, "Manual plan rejected");
                Err(e)
            }
        }
    }

    pub async fn clear_manual_plan(&self) {
        if let Some(previous) = self.resolver.clear_manual().await {
            tracing::info!(plan_id = %previous.plan_id, "Manual plan cleared");
            self.emit(SchedulerEvent::ManualPlanChanged { plan_id: None });
        }
    }

    /// Merge slot overrides for a plan; returns the plan's overrides
    pub async fn set_slot_overrides(&self, plan_id: &str, overrides: &SlotAssignments) -> SlotAssignments {
        let current = self.overrides.set(plan_id, overrides).await;
        tracing::info!(plan_id, overrides = current.len(), "Slot overrides set");
        self.emit(SchedulerEvent::SlotOverridesChanged {
            plan_id: plan_id.to_string(),
        });
        current
    }

    /// Remove a plan's overrides for `slots`, or all of them
    pub async fn clear_slot_overrides(&self, plan_id: &str, slots: Option<&[u32]>) {
        self.overrides.clear(plan_id, slots).await;
        tracing::info!(plan_id, slots = ?slots, "Slot overrides cleared");
        self.emit(SchedulerEvent::SlotOverridesChanged {
            plan_id: plan_id.to_string(),
        });
    }

    pub async fn get_slot_overrides(&self, plan_id: &str) -> SlotAssignments {
        self.overrides.get(plan_id).await
    }

    /// Push the active plan's slots to `sink`
    ///
    /// Every slot `1..=slot_count` is written, with `""` for unassigned ones.
    /// Assignments beyond the slot count are skipped. Does nothing when no
    /// plan is active; returns the applied plan id.
    pub async fn apply_active_plan(&self, sink: &dyn SlotSink) -> Option<String> {
        let Some(active) = self.get_active_plan().await else {
            tracing::info!("No active plan to apply");
            return None;
        };

        self.apply_plan(&active, sink);
        Some(active.plan.plan_id)
    }

    /// Write an already resolved active plan to `sink`
    pub fn apply_plan(&self, active: &ActivePlan, sink: &dyn SlotSink) {
        let assignments = &active.plan.slot_assignments;
        let in_range = 1..=self.slot_count;
        for (slot, name) in assignments.iter().filter(|(slot, _)| !in_range.contains(*slot)) {
            tracing::warn!(
                plan_id = %active.plan.plan_id,
                slot,
                name = %name,
                slot_count = self.slot_count,
                "Assignment beyond configured slot count skipped"
            );
        }

        for slot in 1..=self.slot_count {
            let name = assignments.get(&slot).map(String::as_str).unwrap_or("");
            sink.apply_slot(slot, name);
        }

        tracing::info!(
            plan_id = %active.plan.plan_id,
            source = ?active.source,
            slots = self.slot_count,
            "Applied slot assignments"
        );
    }

    pub async fn is_live(&self) -> bool {
        self.resolver.is_live().await
    }

    pub async fn status(&self) -> SchedulerStatus {
        let state = self.resolver.snapshot().await;
        SchedulerStatus {
            configured: self.check_configuration().await.is_ok(),
            group_count: self.groups.read().await.groups.len(),
            plan_count: state.upcoming.len(),
            live_plan_id: state.current_live.map(|p| p.plan_id),
            manual_plan_id: state.manual.map(|p| p.plan_id),
            last_refresh: self.cache.generated_at().await,
        }
    }
}

impl std::fmt::Debug for SchedulerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerService")
            .field("cache", &self.cache)
            .field("slot_count", &self.slot_count)
            .field("missing_credentials", &self.missing_credentials)
            .finish_non_exhaustive()
    }
}
