//! Per-plan slot overrides
//!
//! Operator corrections layered on top of computed slot assignments. They live
//! for the process lifetime only and never replace the computed mapping.

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::SlotAssignments;

/// Plan id -> forced slot names
#[derive(Debug, Default)]
pub struct SlotOverrideStore {
    overrides: RwLock<HashMap<String, SlotAssignments>>,
}

impl SlotOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge overrides for a plan into the store
    ///
    /// Names are trimmed; an empty name removes that slot's override. A plan
    /// left without overrides is dropped. Returns the plan's overrides after
    /// the update.
    pub async fn set(&self, plan_id: &str, updates: &SlotAssignments) -> SlotAssignments {
        let mut overrides = self.overrides.write().await;
        let entry = overrides.entry(plan_id.to_string()).or_default();

        for (slot, name) in updates {
            let name = name.trim();
            if name.is_empty() {
                entry.remove(slot);
            } else {
                entry.insert(*slot, name.to_string());
            }
        }

        let current = entry.clone();
        if current.is_empty() {
            overrides.remove(plan_id);
        }

        tracing::info!(plan_id, slots = current.len(), "Slot overrides updated");
        current
    }

    /// Remove overrides for a plan: the listed slots, or all of them
    pub async fn clear(&self, plan_id: &str, slots: Option<&[u32]>) {
        let mut overrides = self.overrides.write().await;

        match slots {
            Some(slots) => {
                if let Some(entry) = overrides.get_mut(plan_id) {
                    for slot in slots {
                        entry.remove(slot);
                    }
                    if entry.is_empty() {
                        overrides.remove(plan_id);
                    }
                }
            }
            None => {
                overrides.remove(plan_id);
            }
        }

        tracing::info!(plan_id, ?slots, "Slot overrides cleared");
    }

    pub async fn get(&self, plan_id: &str) -> SlotAssignments {
        self.overrides
            .read()
            .await
            .get(plan_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Computed assignments with this plan's overrides on top
    pub async fn merged(&self, plan_id: &str, computed: &SlotAssignments) -> SlotAssignments {
        let overrides = self.overrides.read().await;
        let mut merged = computed.clone();
        if let Some(forced) = overrides.get(plan_id) {
            merged.extend(forced.iter().map(|(slot, name)| (*slot, name.clone())));
        }
        merged
    }

    /// Plans that currently have overrides
    pub async fn plan_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.overrides.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(pairs: &[(u32, &str)]) -> SlotAssignments {
        pairs.iter().map(|(slot, name)| (*slot, name.to_string())).collect()
    }

    #[tokio::test]
    async fn test_merge_and_restore() {
        let store = SlotOverrideStore::new();
        let computed = slots(&[(4, "Regular"), (5, "Other")]);

        store.set("P1", &slots(&[(4, "Guest")])).await;
        assert_eq!(store.merged("P1", &computed).await, slots(&[(4, "Guest"), (5, "Other")]));
        assert_eq!(store.merged("P2", &computed).await, computed);

        store.clear("P1", None).await;
        assert_eq!(store.merged("P1", &computed).await, computed);
    }

    #[tokio::test]
    async fn test_names_are_trimmed_and_empty_removes() {
        let store = SlotOverrideStore::new();

        let current = store.set("P1", &slots(&[(1, "  Ann "), (2, "Ben")])).await;
        assert_eq!(current, slots(&[(1, "Ann"), (2, "Ben")]));

        let current = store.set("P1", &slots(&[(2, "   ")])).await;
        assert_eq!(current, slots(&[(1, "Ann")]));

        store.set("P1", &slots(&[(1, "")])).await;
        assert!(store.plan_ids().await.is_empty());
    }

    #[test]
    fn test_plan_ids_are_listed() {
        let store = SlotOverrideStore::new();
        tokio_test::block_on(async {
            store.set("P2", &slots(&[(1, "Ann")])).await;
            store.set("P1", &slots(&[(3, "Ben")])).await;
        });

        let ids = tokio_test::block_on(store.plan_ids());
        assert_eq!(ids, vec!["P1".to_string(), "P2".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_selected_slots() {
        let store = SlotOverrideStore::new();
        store.set("P1", &slots(&[(1, "Ann"), (2, "Ben"), (3, "Cat")])).await;

        store.clear("P1", Some(&[1, 3])).await;
        assert_eq!(store.get("P1").await, slots(&[(2, "Ben")]));

        store.clear("P1", Some(&[2])).await;
        assert!(store.plan_ids().await.is_empty());

        // Clearing an unknown plan is a no-op
        store.clear("missing", Some(&[1])).await;
    }
}
