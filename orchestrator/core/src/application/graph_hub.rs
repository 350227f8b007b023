// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Graph Hub
//!
//! Owns the [`GraphState`] of the graph role together with the registry of
//! connected observers, behind one lock. Keeping both under the same lock is
//! what gives each observer the "snapshot + live tail" guarantee:
//!
//! - [`GraphHub::subscribe`] queues the snapshot and registers the observer in
//!   one critical section, so no publish can fall between the two.
//! - [`GraphHub::publish`] merges and enqueues in one critical section, so
//!   every observer sees publishes in the same order they were applied.
//!
//! Enqueueing never waits (see [`ObserverRegistry`]), so the lock is only held
//! for in-memory work.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::atom::Atom;
use crate::domain::atom_sink::{AtomSink, SinkError};
use crate::domain::events::GraphEvent;
use crate::domain::graph::{GraphSnapshot, GraphState, MergeOutcome};
use crate::infrastructure::observer_registry::{
    observer_channel, ObserverId, ObserverReceiver, ObserverRegistry,
};

/// A registered observer: its id plus the queue the connection drains.
/// The first queued message is always the `atoms-update` snapshot.
pub struct Subscription {
    pub id: ObserverId,
    pub receiver: ObserverReceiver<GraphEvent>,
}

struct HubInner {
    state: GraphState,
    observers: ObserverRegistry<GraphEvent>,
}

pub struct GraphHub {
    inner: Mutex<HubInner>,
}

impl Default for GraphHub {
    fn default() -> Self {
        Self::new(GraphState::new())
    }
}

impl GraphHub {
    pub fn new(state: GraphState) -> Self {
        Self {
            inner: Mutex::new(HubInner {
                state,
                observers: ObserverRegistry::new(),
            }),
        }
    }

    /// Merge `atom` (last write wins) and fan it out, followed by the full
    /// order. Never waits on observers.
    pub fn publish(&self, atom: Atom) {
        let mut inner = self.inner.lock();
        let id = atom.id.clone();
        let outcome = inner.state.merge(atom);

        let stored = match inner.state.get(&id) {
            Some(atom) => atom.clone(),
            None => return,
        };
        let order = inner.state.order().to_vec();

        let delivered = inner.observers.broadcast(&GraphEvent::AtomUpdate(stored));
        inner.observers.broadcast(&GraphEvent::AtomsOrder(order));

        metrics::counter!("atomgraph_atoms_published_total").increment(1);
        debug!(
            atom = %id,
            replaced = outcome == MergeOutcome::Replaced,
            observers = delivered,
            "Published atom"
        );
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.inner.lock().state.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<Atom> {
        self.inner.lock().state.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().state.is_empty()
    }

    pub fn subscribe(&self) -> Subscription {
        let (handle, receiver) = observer_channel();
        let mut inner = self.inner.lock();
        handle.send(GraphEvent::AtomsUpdate(inner.state.snapshot()));
        let id = inner.observers.register(handle);
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.inner.lock().observers.deregister(id)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().observers.len()
    }

    pub fn close_observers(&self) -> usize {
        self.inner.lock().observers.close_all()
    }
}

#[async_trait]
impl AtomSink for GraphHub {
    async fn publish_atom(&self, atom: Atom) -> Result<(), SinkError> {
        self.publish(atom);
        Ok(())
    }

    async fn snapshot(&self) -> Result<GraphSnapshot, SinkError> {
        Ok(GraphHub::snapshot(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::atom::AtomKind;

    fn atom(id: &str, kind: AtomKind, deps: &[&str], confidence: f64) -> Atom {
        Atom::new(id, kind, format!("content of {}", id))
            .with_dependencies(deps.iter().copied())
            .with_confidence(confidence)
    }

    fn drain(sub: &mut Subscription) -> Vec<GraphEvent> {
        let mut events = Vec::new();
        while let Ok(event) = sub.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_new_observer_gets_snapshot_first() {
        let hub = GraphHub::default();
        hub.publish(atom("a1", AtomKind::Premise, &[], 0.9));
        hub.publish(atom("a2", AtomKind::Reasoning, &["a1"], 0.7));

        let mut sub = hub.subscribe();
        let events = drain(&mut sub);
        assert_eq!(events.len(), 1);

        match &events[0] {
            GraphEvent::AtomsUpdate(snapshot) => {
                assert_eq!(snapshot.atom_order, ["a1", "a2"]);
                assert_eq!(snapshot.atoms.len(), 2);
                let a2 = snapshot.get("a2").unwrap();
                assert_eq!(a2.kind, AtomKind::Reasoning);
                assert_eq!(a2.dependencies, vec!["a1"]);
                assert_eq!(a2.confidence, 0.7);
                assert!(!a2.verified);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_live_tail_is_atom_then_order() {
        let hub = GraphHub::default();
        let mut sub = hub.subscribe();
        drain(&mut sub);

        hub.publish(atom("a1", AtomKind::Premise, &[], 0.9));
        hub.publish(atom("a2", AtomKind::Conclusion, &["a1"], 0.5));

        let types: Vec<_> = drain(&mut sub).iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            ["atom-update", "atoms-order", "atom-update", "atoms-order"]
        );
    }

    #[test]
    fn test_publishes_before_connect_are_only_in_snapshot() {
        let hub = GraphHub::default();
        for i in 0..5 {
            hub.publish(atom(&format!("a{}", i), AtomKind::Premise, &[], 0.5));
        }

        let mut sub = hub.subscribe();
        hub.publish(atom("late", AtomKind::Hypothesis, &[], 0.5));

        let events = drain(&mut sub);
        assert_eq!(events.len(), 3);
        match &events[0] {
            GraphEvent::AtomsUpdate(snapshot) => {
                assert_eq!(snapshot.len(), 5);
                assert!(snapshot.get("late").is_none());
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        assert_eq!(events[1], GraphEvent::AtomUpdate(hub.get("late").unwrap()));
    }

    #[test]
    fn test_republish_is_idempotent_on_order() {
        let hub = GraphHub::default();
        hub.publish(atom("a1", AtomKind::Premise, &[], 0.9));
        hub.publish(Atom::new("a1", AtomKind::Premise, "rewritten").with_confidence(0.4));

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.atom_order, ["a1"]);
        assert_eq!(snapshot.atoms[0].content, "rewritten");
        assert_eq!(snapshot.atoms[0].confidence, 0.4);
    }

    #[test]
    fn test_dead_observer_does_not_block_others() {
        let hub = GraphHub::default();
        let dead = hub.subscribe();
        let mut live = hub.subscribe();
        drop(dead.receiver);
        drain(&mut live);

        hub.publish(atom("a1", AtomKind::Premise, &[], 0.9));

        assert_eq!(hub.observer_count(), 1);
        assert_eq!(drain(&mut live).len(), 2);
    }

    #[test]
    fn test_close_observers_ends_every_queue() {
        let hub = GraphHub::default();
        let mut sub = hub.subscribe();
        drain(&mut sub);

        assert_eq!(hub.close_observers(), 1);
        assert!(matches!(
            sub.receiver.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_hub_as_atom_sink() {
        let hub = GraphHub::default();
        let sink: &dyn AtomSink = &hub;
        sink.publish_atom(atom("a1", AtomKind::Verification, &["missing"], 1.0))
            .await
            .unwrap();

        let snapshot = sink.snapshot().await.unwrap();
        assert_eq!(snapshot.atom_order, ["a1"]);
        assert_eq!(snapshot.atoms[0].dependencies, vec!["missing"]);
    }
}
