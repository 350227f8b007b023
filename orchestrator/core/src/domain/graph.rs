// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Graph State - the authoritative atom graph held by the graph role owner.
//!
//! Two structures are kept in lockstep:
//!
//! - `atoms`: id -> latest [`Atom`] (last write wins, dependencies included)
//! - `order`: ids in first-seen order, append-only
//!
//! `order` always holds every key of `atoms` exactly once and nothing else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::atom::{Atom, AtomId};

/// Full state as delivered to late joiners and new observers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    /// Atoms listed in insertion order
    pub atoms: Vec<Atom>,
    pub atom_order: Vec<AtomId>,
}

impl GraphSnapshot {
    pub fn len(&self) -> usize {
        self.atom_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atom_order.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Atom> {
        self.atoms.iter().find(|a| a.id == id)
    }
}

/// Outcome of merging one atom into the state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
}

#[derive(Debug, Default)]
pub struct GraphState {
    atoms: HashMap<AtomId, Atom>,
    order: Vec<AtomId>,
    last_created_at: Option<DateTime<Utc>>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an atom. A repeated id fully replaces the stored atom but keeps
    /// its position in the order and its original `created_at`.
    pub fn merge(&mut self, mut atom: Atom) -> MergeOutcome {
        match self.atoms.get(&atom.id) {
            Some(existing) => {
                atom.created_at = existing.created_at;
                self.atoms.insert(atom.id.clone(), atom);
                MergeOutcome::Replaced
            }
            None => {
                atom.created_at = Some(self.next_created_at());
                self.order.push(atom.id.clone());
                self.atoms.insert(atom.id.clone(), atom);
                MergeOutcome::Inserted
            }
        }
    }

    // Wall clock can step backwards; assigned timestamps must not.
    fn next_created_at(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_created_at = Some(stamp);
        stamp
    }

    pub fn get(&self, id: &str) -> Option<&Atom> {
        self.atoms.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.atoms.contains_key(id)
    }

    pub fn order(&self) -> &[AtomId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Dependency ids of `id` that have no atom yet
    pub fn dangling_dependencies(&self, id: &str) -> Vec<AtomId> {
        self.atoms
            .get(id)
            .map(|atom| {
                atom.dependencies
                    .iter()
                    .filter(|dep| !self.atoms.contains_key(dep.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let atoms = self
            .order
            .iter()
            .filter_map(|id| self.atoms.get(id).cloned())
            .collect();

        GraphSnapshot {
            atoms,
            atom_order: self.order.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::atom::AtomKind;
    use std::collections::HashSet;

    fn premise(id: &str, content: &str) -> Atom {
        Atom::new(id, AtomKind::Premise, content).with_confidence(0.9)
    }

    #[test]
    fn test_repeat_id_replaces_without_growing_order() {
        let mut state = GraphState::new();
        assert_eq!(state.merge(premise("a1", "first")), MergeOutcome::Inserted);
        assert_eq!(state.merge(premise("a1", "second")), MergeOutcome::Replaced);

        assert_eq!(state.len(), 1);
        assert_eq!(state.get("a1").unwrap().content, "second");
    }

    #[test]
    fn test_replacement_swaps_dependency_set() {
        let mut state = GraphState::new();
        state.merge(premise("a2", "").with_dependencies(["a1", "x"]));
        state.merge(premise("a2", "").with_dependencies(["y"]));

        assert_eq!(state.get("a2").unwrap().dependencies, vec!["y"]);
    }

    #[test]
    fn test_created_at_is_kept_across_replacement() {
        let mut state = GraphState::new();
        state.merge(premise("a1", "first"));
        let first_stamp = state.get("a1").unwrap().created_at;

        let mut update = premise("a1", "second");
        update.created_at = Some(Utc::now() + chrono::Duration::days(3));
        state.merge(update);

        assert!(first_stamp.is_some());
        assert_eq!(state.get("a1").unwrap().created_at, first_stamp);
    }

    #[test]
    fn test_created_at_never_decreases() {
        let mut state = GraphState::new();
        state.last_created_at = Some(Utc::now() + chrono::Duration::hours(1));
        let future = state.last_created_at;

        state.merge(premise("a1", ""));
        assert_eq!(state.get("a1").unwrap().created_at, future);
    }

    #[test]
    fn test_order_matches_keys_exactly() {
        let mut state = GraphState::new();
        for id in ["a1", "a2", "a1", "a3", "a2"] {
            state.merge(premise(id, id));
        }

        let order: HashSet<_> = state.order().iter().cloned().collect();
        let keys: HashSet<_> = state.atoms.keys().cloned().collect();
        assert_eq!(order, keys);
        assert_eq!(state.order(), ["a1", "a2", "a3"]);
    }

    #[test]
    fn test_dangling_dependencies_are_stored_as_given() {
        let mut state = GraphState::new();
        state.merge(premise("a2", "").with_dependencies(["a1"]));
        assert_eq!(state.dangling_dependencies("a2"), vec!["a1"]);

        state.merge(premise("a1", ""));
        assert!(state.dangling_dependencies("a2").is_empty());
    }

    #[test]
    fn test_snapshot_lists_atoms_in_insertion_order() {
        let mut state = GraphState::new();
        state.merge(premise("b", ""));
        state.merge(premise("a", ""));

        let snapshot = state.snapshot();
        let ids: Vec<_> = snapshot.atoms.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(snapshot.atom_order, ["b", "a"]);
    }
}
