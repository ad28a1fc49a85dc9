//! Slot Mapping Engine
//!
//! Resolves a provider position name to a slot number. Lookup order for a
//! normalized position name:
//!
//! 1. rules of the plan's own group (name rules, plus ID rules resolved to
//!    position names through the [`PositionCatalog`])
//! 2. global rules: every group's name rules, overlaid with the configured
//!    `global_rules`
//! 3. the `mic<N>` pattern, for `1 <= N <= max_pattern_slot`
//!
//! Anything else is dropped.

use std::collections::{BTreeSet, HashMap};

use crate::models::{Assignment, ScheduleGroup, SlotAssignments, SlotMappingRule};
use crate::provider::NamedResource;
use crate::utils::{normalize_position_name, pattern_slot};

/// Team position names fetched from the provider, keyed by group and team
///
/// Position IDs are only meaningful within the group (service type) they
/// were fetched for.
#[derive(Debug, Clone, Default)]
pub struct PositionCatalog {
    teams: HashMap<(String, String), HashMap<String, String>>,
}

impl PositionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the positions of one team
    pub fn insert_team(&mut self, group_id: &str, team_id: &str, positions: Vec<NamedResource>) {
        let names = positions
            .into_iter()
            .map(|position| (position.id, position.name))
            .collect();
        self.teams
            .insert((group_id.to_string(), team_id.to_string()), names);
    }

    pub fn has_team(&self, group_id: &str, team_id: &str) -> bool {
        self.teams
            .contains_key(&(group_id.to_string(), team_id.to_string()))
    }

    /// Name of a position, if its team has been fetched
    pub fn position_name(&self, group_id: &str, team_id: &str, position_id: &str) -> Option<&str> {
        self.teams
            .get(&(group_id.to_string(), team_id.to_string()))?
            .get(position_id)
            .map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.teams.clear();
    }

    /// Forget every team fetched for one group
    pub fn clear_group(&mut self, group_id: &str) {
        self.teams.retain(|(group, _), _| group != group_id);
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// Team ids referenced by a group's ID-based rules
pub fn referenced_teams(group: &ScheduleGroup) -> BTreeSet<&str> {
    group
        .rules
        .iter()
        .filter_map(|rule| match rule {
            SlotMappingRule::IdBased { team_id, .. } => Some(team_id.as_str()),
            SlotMappingRule::NameBased { .. } => None,
        })
        .collect()
}

/// Layered position-name to slot lookup, built once per refresh
#[derive(Debug, Clone, Default)]
pub struct SlotMappingEngine {
    groups: HashMap<String, HashMap<String, u32>>,
    global: HashMap<String, u32>,
    max_pattern_slot: u32,
}

impl SlotMappingEngine {
    /// Build the lookup tables
    ///
    /// ID-based rules whose position is missing from `catalog` are skipped
    /// for this build; they resolve once the team has been fetched.
    pub fn build(
        groups: &[ScheduleGroup],
        global_rules: &[SlotMappingRule],
        max_pattern_slot: u32,
        catalog: &PositionCatalog,
    ) -> Self {
        let mut engine = Self {
            groups: HashMap::with_capacity(groups.len()),
            global: HashMap::new(),
            max_pattern_slot,
        };

        for group in groups {
            let mut table = HashMap::new();

            for rule in &group.rules {
                let name = match rule {
                    SlotMappingRule::NameBased { position_name, .. } => {
                        engine.add_global(position_name, rule.slot());
                        Some(position_name.as_str())
                    }
                    SlotMappingRule::IdBased {
                        team_id,
                        position_id,
                        ..
                    } => {
                        let resolved = catalog.position_name(&group.id, team_id, position_id);
                        if resolved.is_none() {
                            tracing::debug!(
                                group_id = %group.id,
                                team_id = %team_id,
                                position_id = %position_id,
                                "ID rule not resolvable yet"
                            );
                        }
                        resolved
                    }
                };

                if let Some(name) = name {
                    let key = normalize_position_name(name);
                    if !key.is_empty() {
                        table.insert(key, rule.slot());
                    }
                }
            }

            engine.groups.insert(group.id.clone(), table);
        }

        for rule in global_rules {
            if let SlotMappingRule::NameBased { position_name, .. } = rule {
                engine.add_global(position_name, rule.slot());
            }
        }

        engine
    }

    fn add_global(&mut self, position_name: &str, slot: u32) {
        let key = normalize_position_name(position_name);
        if !key.is_empty() {
            self.global.insert(key, slot);
        }
    }

    /// Resolve a position name for a plan of `group_id`
    pub fn resolve_slot(&self, position_name: &str, group_id: &str) -> Option<u32> {
        let key = normalize_position_name(position_name);
        if key.is_empty() {
            return None;
        }

        self.groups
            .get(group_id)
            .and_then(|table| table.get(&key))
            .or_else(|| self.global.get(&key))
            .copied()
            .or_else(|| pattern_slot(&key, self.max_pattern_slot))
    }

    /// Map a plan's assignments onto slots
    ///
    /// Assignments without a person or position name are ignored. When
    /// several assignments land on one slot, the last one wins.
    pub fn map_assignments(&self, assignments: &[Assignment], group_id: &str) -> SlotAssignments {
        let mut slots = SlotAssignments::new();

        for assignment in assignments {
            let person = assignment.person_name.trim();
            if person.is_empty() || assignment.position_name.trim().is_empty() {
                continue;
            }

            match self.resolve_slot(&assignment.position_name, group_id) {
                Some(slot) => {
                    if let Some(previous) = slots.insert(slot, person.to_string()) {
                        tracing::debug!(
                            group_id,
                            slot,
                            replaced = %previous,
                            person,
                            "Slot already assigned, last assignment wins"
                        );
                    }
                }
                None => {
                    tracing::trace!(group_id, position = %assignment.position_name, "Position not mapped");
                }
            }
        }

        slots
    }

    /// Number of rules resolved for a group
    pub fn group_rule_count(&self, group_id: &str) -> usize {
        self.groups.get(group_id).map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(groups: &[ScheduleGroup], global: &[SlotMappingRule]) -> SlotMappingEngine {
        SlotMappingEngine::build(groups, global, 32, &PositionCatalog::new())
    }

    #[test]
    fn test_group_rule_wins_over_global() {
        let groups = vec![
            ScheduleGroup::new("s1", "Sunday").with_rule(SlotMappingRule::by_name("Worship Leader", 2)),
            ScheduleGroup::new("s2", "Youth").with_rule(SlotMappingRule::by_name("Worship Leader", 5)),
        ];
        let engine = engine(&groups, &[]);

        assert_eq!(engine.resolve_slot("worship leader", "s1"), Some(2));
        assert_eq!(engine.resolve_slot("Worship-Leader", "s2"), Some(5));
    }

    #[test]
    fn test_unconfigured_group_uses_global_rules() {
        let groups = vec![ScheduleGroup::new("s1", "Sunday").with_rule(SlotMappingRule::by_name("Bass", 4))];
        let global = vec![SlotMappingRule::by_name("Keys", 6)];
        let engine = engine(&groups, &global);

        assert_eq!(engine.resolve_slot("Bass", "unknown"), Some(4));
        assert_eq!(engine.resolve_slot("KEYS", "s1"), Some(6));
    }

    #[test]
    fn test_configured_global_rules_override_group_union() {
        let groups = vec![ScheduleGroup::new("s1", "Sunday").with_rule(SlotMappingRule::by_name("Host", 1))];
        let global = vec![SlotMappingRule::by_name("Host", 3)];
        let engine = engine(&groups, &global);

        assert_eq!(engine.resolve_slot("Host", "s1"), Some(1));
        assert_eq!(engine.resolve_slot("Host", "s9"), Some(3));
    }

    #[test]
    fn test_mic_pattern_fallback() {
        let engine = engine(&[ScheduleGroup::new("s1", "Sunday")], &[]);

        assert_eq!(engine.resolve_slot("Mic 3", "s1"), Some(3));
        assert_eq!(engine.resolve_slot("mic-12", "s1"), Some(12));
        assert_eq!(engine.resolve_slot("Mic 33", "s1"), None);
        assert_eq!(engine.resolve_slot("Drums", "s1"), None);
        assert_eq!(engine.resolve_slot("   ", "s1"), None);
    }

    #[test]
    fn test_id_rules_resolve_through_catalog() {
        let group = ScheduleGroup::new("s1", "Sunday").with_rule(SlotMappingRule::by_id("t1", "p7", 2));
        let mut catalog = PositionCatalog::new();

        let unresolved = SlotMappingEngine::build(std::slice::from_ref(&group), &[], 32, &catalog);
        assert_eq!(unresolved.resolve_slot("Lead Vocal", "s1"), None);

        catalog.insert_team(
            "s1",
            "t1",
            vec![NamedResource {
                id: "p7".to_string(),
                name: "Lead Vocal".to_string(),
            }],
        );
        let resolved = SlotMappingEngine::build(std::slice::from_ref(&group), &[], 32, &catalog);
        assert_eq!(resolved.resolve_slot("lead_vocal", "s1"), Some(2));
        assert_eq!(resolved.group_rule_count("s1"), 1);
    }

    #[test]
    fn test_map_assignments_worship_leader() {
        let groups = vec![ScheduleGroup::new("S1", "Sunday").with_rule(SlotMappingRule::by_name("Worship Leader", 2))];
        let engine = engine(&groups, &[]);

        let slots = engine.map_assignments(&[Assignment::new("Worship Leader", "Jane Doe")], "S1");

        assert_eq!(slots, SlotAssignments::from([(2, "Jane Doe".to_string())]));
    }

    #[test]
    fn test_map_assignments_skips_blank_and_last_wins() {
        let groups = vec![ScheduleGroup::new("s1", "Sunday")
            .with_rule(SlotMappingRule::by_name("Vocal 1", 2))
            .with_rule(SlotMappingRule::by_name("Vocal 2", 2))];
        let engine = engine(&groups, &[]);

        let slots = engine.map_assignments(
            &[
                Assignment::new("Vocal 1", "Ann"),
                Assignment::new("Vocal 2", "Ben"),
                Assignment::new("Mic 4", "  "),
                Assignment::new("", "Cat"),
            ],
            "s1",
        );

        assert_eq!(slots, SlotAssignments::from([(2, "Ben".to_string())]));
    }

    #[test]
    fn test_referenced_teams() {
        let group = ScheduleGroup::new("s1", "Sunday")
            .with_rule(SlotMappingRule::by_id("t2", "p1", 1))
            .with_rule(SlotMappingRule::by_id("t1", "p2", 2))
            .with_rule(SlotMappingRule::by_id("t2", "p3", 3))
            .with_rule(SlotMappingRule::by_name("Keys", 4));

        assert_eq!(referenced_teams(&group).into_iter().collect::<Vec<_>>(), vec!["t1", "t2"]);
    }
}
