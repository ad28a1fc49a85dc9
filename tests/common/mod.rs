//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use slotroster::config::Config;
use slotroster::models::{Assignment, ScheduleGroup, ServiceTime};
use slotroster::provider::{FetchResult, NamedResource, PlanSource, RemotePlan};
use slotroster::utils::error::FetchError;

/// A plan as served by [`FakeSource`]
#[derive(Debug, Clone)]
pub struct FakePlan {
    pub remote: RemotePlan,
    pub times: Vec<ServiceTime>,
    pub assignments: Vec<Assignment>,
}

impl FakePlan {
    pub fn new(id: &str, starts_at: DateTime<Utc>) -> Self {
        Self {
            remote: RemotePlan {
                id: id.to_string(),
                title: format!("Plan {id}"),
                dates: starts_at.format("%B %-d, %Y").to_string(),
            },
            times: vec![ServiceTime {
                starts_at,
                name: None,
            }],
            assignments: Vec::new(),
        }
    }

    pub fn with_assignment(mut self, position: &str, person: &str) -> Self {
        self.assignments.push(Assignment::new(position, person));
        self
    }

    pub fn with_time(mut self, starts_at: DateTime<Utc>) -> Self {
        self.times.push(ServiceTime {
            starts_at,
            name: None,
        });
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    plans: HashMap<String, Vec<FakePlan>>,
    positions: HashMap<(String, String), Vec<NamedResource>>,
    failing_groups: HashSet<String>,
    failing_times: HashSet<String>,
    failing_assignments: HashSet<String>,
    assignment_calls: HashMap<String, usize>,
    position_calls: usize,
    plan_list_calls: usize,
}

/// In-memory provider with per-call failure toggles
#[derive(Debug, Default)]
pub struct FakeSource {
    state: Mutex<FakeState>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plans(&self, group_id: &str, plans: Vec<FakePlan>) {
        self.state
            .lock()
            .unwrap()
            .plans
            .insert(group_id.to_string(), plans);
    }

    pub fn set_positions(&self, group_id: &str, team_id: &str, positions: &[(&str, &str)]) {
        let positions = positions
            .iter()
            .map(|(id, name)| NamedResource {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect();
        self.state
            .lock()
            .unwrap()
            .positions
            .insert((group_id.to_string(), team_id.to_string()), positions);
    }

    /// Make the plan list of `group_id` fail (or succeed again)
    pub fn fail_group(&self, group_id: &str, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_groups.insert(group_id.to_string());
        } else {
            state.failing_groups.remove(group_id);
        }
    }

    pub fn fail_times(&self, plan_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_times
            .insert(plan_id.to_string());
    }

    pub fn fail_assignments(&self, plan_id: &str, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_assignments.insert(plan_id.to_string());
        } else {
            state.failing_assignments.remove(plan_id);
        }
    }

    pub fn assignment_calls(&self, plan_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .assignment_calls
            .get(plan_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn position_calls(&self) -> usize {
        self.state.lock().unwrap().position_calls
    }

    pub fn plan_list_calls(&self) -> usize {
        self.state.lock().unwrap().plan_list_calls
    }

    fn find_plan(&self, group_id: &str, plan_id: &str) -> Option<FakePlan> {
        self.state
            .lock()
            .unwrap()
            .plans
            .get(group_id)?
            .iter()
            .find(|p| p.remote.id == plan_id)
            .cloned()
    }
}

#[async_trait]
impl PlanSource for FakeSource {
    async fn future_plans(&self, group_id: &str, limit: u32) -> FetchResult<Vec<RemotePlan>> {
        let mut state = self.state.lock().unwrap();
        state.plan_list_calls += 1;
        if state.failing_groups.contains(group_id) {
            return Err(FetchError::MaxRetriesExceeded {
                attempts: 3,
                last: "Server error: 503".to_string(),
            });
        }
        Ok(state
            .plans
            .get(group_id)
            .map(|plans| {
                plans
                    .iter()
                    .take(limit as usize)
                    .map(|p| p.remote.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn plan_times(&self, group_id: &str, plan_id: &str) -> FetchResult<Vec<ServiceTime>> {
        if self.state.lock().unwrap().failing_times.contains(plan_id) {
            return Err(FetchError::Timeout);
        }
        Ok(self
            .find_plan(group_id, plan_id)
            .map(|p| p.times)
            .unwrap_or_default())
    }

    async fn plan_assignments(
        &self,
        group_id: &str,
        plan_id: &str,
    ) -> FetchResult<Vec<Assignment>> {
        {
            let mut state = self.state.lock().unwrap();
            *state.assignment_calls.entry(plan_id.to_string()).or_default() += 1;
            if state.failing_assignments.contains(plan_id) {
                return Err(FetchError::RateLimited);
            }
        }
        Ok(self
            .find_plan(group_id, plan_id)
            .map(|p| p.assignments)
            .unwrap_or_default())
    }

    async fn teams(&self, group_id: &str) -> FetchResult<Vec<NamedResource>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .positions
            .keys()
            .filter(|(group, _)| group == group_id)
            .map(|(_, team)| NamedResource {
                id: team.clone(),
                name: format!("Team {team}"),
            })
            .collect())
    }

    async fn team_positions(
        &self,
        group_id: &str,
        team_id: &str,
    ) -> FetchResult<Vec<NamedResource>> {
        let mut state = self.state.lock().unwrap();
        state.position_calls += 1;
        Ok(state
            .positions
            .get(&(group_id.to_string(), team_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// UTC offset (minutes) under which `now` is close to local noon
///
/// Keeps windows computed around `Utc::now()` clear of midnight.
pub fn midday_offset_minutes(now: DateTime<Utc>) -> i32 {
    let minute_of_day = (now.hour() * 60 + now.minute()) as i32;
    720 - minute_of_day
}

/// Config with the given groups and a day boundary placing now at midday
pub fn test_config(groups: Vec<ScheduleGroup>) -> Config {
    let mut config = Config::default();
    config.groups = groups;
    config.scheduler.utc_offset_minutes = Some(midday_offset_minutes(Utc::now()));
    config
}

/// `Utc::now()` shifted by whole hours
pub fn hours_from_now(hours: i64) -> DateTime<Utc> {
    Utc::now() + Duration::hours(hours)
}
