// Core data structures for slotroster

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slot number -> person name, built once per fetch
pub type SlotAssignments = BTreeMap<u32, String>;

/// Lead time applied when a group does not configure one
pub const DEFAULT_LEAD_TIME_HOURS: u32 = 2;

fn default_lead_time_hours() -> u32 {
    DEFAULT_LEAD_TIME_HOURS
}

/// A configured rule mapping a provider role onto a slot
///
/// ID-based rules reference provider team/position identifiers, which differ
/// between groups for the same conceptual role, so they are resolved to
/// position names against fetched team metadata before matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SlotMappingRule {
    #[serde(rename = "id")]
    IdBased {
        team_id: String,
        position_id: String,
        slot: u32,
    },

    #[serde(rename = "name")]
    NameBased {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team_name: Option<String>,
        position_name: String,
        slot: u32,
    },
}

impl SlotMappingRule {
    /// Create a name-based rule without a team qualifier
    pub fn by_name(position_name: impl Into<String>, slot: u32) -> Self {
        Self::NameBased {
            team_name: None,
            position_name: position_name.into(),
            slot,
        }
    }

    /// Create an ID-based rule
    pub fn by_id(team_id: impl Into<String>, position_id: impl Into<String>, slot: u32) -> Self {
        Self::IdBased {
            team_id: team_id.into(),
            position_id: position_id.into(),
            slot,
        }
    }

    /// Target slot of this rule
    pub fn slot(&self) -> u32 {
        match self {
            Self::IdBased { slot, .. } | Self::NameBased { slot, .. } => *slot,
        }
    }

    pub fn is_id_based(&self) -> bool {
        matches!(self, Self::IdBased { .. })
    }
}

/// A provider-side category of recurring events (a service type)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleGroup {
    /// Opaque provider identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Hours before the earliest service time at which a plan goes live
    #[serde(default = "default_lead_time_hours")]
    pub lead_time_hours: u32,

    /// Slot mapping rules for this group
    #[serde(default)]
    pub rules: Vec<SlotMappingRule>,
}

impl ScheduleGroup {
    /// Create a group with default lead time and no rules
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lead_time_hours: DEFAULT_LEAD_TIME_HOURS,
            rules: Vec::new(),
        }
    }

    /// Set lead time
    pub fn with_lead_time_hours(mut self, hours: u32) -> Self {
        self.lead_time_hours = hours;
        self
    }

    /// Add a mapping rule
    pub fn with_rule(mut self, rule: SlotMappingRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Name for logs and listings, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn has_id_rules(&self) -> bool {
        self.rules.iter().any(SlotMappingRule::is_id_based)
    }

    /// Slots targeted by more than one rule (last applied wins at runtime)
    pub fn duplicate_slots(&self) -> Vec<u32> {
        let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
        for rule in &self.rules {
            *counts.entry(rule.slot()).or_insert(0) += 1;
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(slot, _)| slot)
            .collect()
    }
}

/// One service time of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTime {
    pub starts_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Assignment status as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentStatus {
    Confirmed,
    Unconfirmed,
    Declined,
}

impl AssignmentStatus {
    /// Parse the provider's single-letter status code
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "C" => Some(Self::Confirmed),
            "U" => Some(Self::Unconfirmed),
            "D" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// A person assigned to a role in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub person_name: String,
    pub position_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AssignmentStatus>,
}

impl Assignment {
    pub fn new(position_name: impl Into<String>, person_name: impl Into<String>) -> Self {
        Self {
            person_name: person_name.into(),
            position_name: position_name.into(),
            status: None,
        }
    }
}

/// Raw fetched detail of one plan, cached by plan id across groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDetail {
    pub plan_id: String,
    pub group_id: String,
    pub service_times: Vec<ServiceTime>,
    pub assignments: Vec<Assignment>,
    pub fetched_at: DateTime<Utc>,
}

impl PlanDetail {
    /// Earliest of all service times
    pub fn earliest_service_time(&self) -> Option<DateTime<Utc>> {
        self.service_times.iter().map(|t| t.starts_at).min()
    }
}

/// One concrete future occurrence of a schedule group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub group_id: String,
    pub group_name: String,
    pub title: String,
    pub date_label: String,
    pub earliest_service_time: DateTime<Utc>,
    pub live_window_start: DateTime<Utc>,
    pub live_window_end: DateTime<Utc>,
    pub slot_assignments: SlotAssignments,
}

impl Plan {
    /// Whether `now` falls inside the half-open live window
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.live_window_start <= now && now < self.live_window_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rule_serde_tagging() {
        let toml_src = r#"
            id = "546904"
            name = "Sunday"
            rules = [
                { kind = "name", position_name = "Worship Leader", slot = 2 },
                { kind = "id", team_id = "11", position_id = "22", slot = 3 },
            ]
        "#;
        let group: ScheduleGroup = toml::from_str(toml_src).unwrap();

        assert_eq!(group.lead_time_hours, DEFAULT_LEAD_TIME_HOURS);
        assert_eq!(group.rules[0], SlotMappingRule::by_name("Worship Leader", 2));
        assert_eq!(group.rules[1], SlotMappingRule::by_id("11", "22", 3));
        assert!(group.has_id_rules());
    }

    #[test]
    fn test_duplicate_slots() {
        let group = ScheduleGroup::new("1", "Sunday")
            .with_rule(SlotMappingRule::by_name("Vocal 1", 2))
            .with_rule(SlotMappingRule::by_name("Vocal 2", 2))
            .with_rule(SlotMappingRule::by_name("Keys", 3));

        assert_eq!(group.duplicate_slots(), vec![2]);
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        assert_eq!(ScheduleGroup::new("42", "").display_name(), "42");
        assert_eq!(ScheduleGroup::new("42", "Sunday").display_name(), "Sunday");
    }

    #[test]
    fn test_earliest_service_time() {
        let early = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 3, 1, 11, 0, 0).unwrap();
        let detail = PlanDetail {
            plan_id: "p".to_string(),
            group_id: "g".to_string(),
            service_times: vec![
                ServiceTime { starts_at: late, name: None },
                ServiceTime { starts_at: early, name: Some("First".to_string()) },
            ],
            assignments: vec![],
            fetched_at: Utc::now(),
        };

        assert_eq!(detail.earliest_service_time(), Some(early));
    }

    #[test]
    fn test_assignment_status_codes() {
        assert_eq!(AssignmentStatus::from_code("C"), Some(AssignmentStatus::Confirmed));
        assert_eq!(AssignmentStatus::from_code("D"), Some(AssignmentStatus::Declined));
        assert_eq!(AssignmentStatus::from_code("?"), None);
    }
}
