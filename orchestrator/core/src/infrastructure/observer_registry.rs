// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Observer Registry - fan-out to a dynamic set of live connections
//
// Each observer is an opaque handle wrapping an unbounded queue. Sending never
// waits: a slow connection only grows its own queue, and a closed one is
// dropped from the registry on the next broadcast.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObserverId(pub Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sending half held by the registry
#[derive(Debug)]
pub struct ObserverHandle<M> {
    id: ObserverId,
    sender: mpsc::UnboundedSender<M>,
}

impl<M> Clone for ObserverHandle<M> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sender: self.sender.clone(),
        }
    }
}

impl<M> ObserverHandle<M> {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Queue a message for this observer only
    pub fn send(&self, message: M) -> bool {
        self.sender.send(message).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving half owned by the connection task
pub type ObserverReceiver<M> = mpsc::UnboundedReceiver<M>;

/// Create a handle/receiver pair that is not yet registered
pub fn observer_channel<M>() -> (ObserverHandle<M>, ObserverReceiver<M>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        ObserverHandle {
            id: ObserverId::new(),
            sender,
        },
        receiver,
    )
}

#[derive(Debug)]
pub struct ObserverRegistry<M> {
    observers: BTreeMap<ObserverId, ObserverHandle<M>>,
}

impl<M> Default for ObserverRegistry<M> {
    fn default() -> Self {
        Self {
            observers: BTreeMap::new(),
        }
    }
}

impl<M: Clone> ObserverRegistry<M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handle: ObserverHandle<M>) -> ObserverId {
        let id = handle.id;
        self.observers.insert(id, handle);
        metrics::gauge!("atomgraph_observers_connected").set(self.observers.len() as f64);
        debug!(observer = %id, total = self.observers.len(), "Observer registered");
        id
    }

    pub fn deregister(&mut self, id: ObserverId) -> bool {
        let removed = self.observers.remove(&id).is_some();
        if removed {
            metrics::gauge!("atomgraph_observers_connected").set(self.observers.len() as f64);
            debug!(observer = %id, total = self.observers.len(), "Observer deregistered");
        }
        removed
    }

    /// Queue `message` on every observer and return how many accepted it.
    ///
    /// Iterates a copy of the handle set; observers whose queue is closed are
    /// removed afterwards and never abort delivery to the rest.
    pub fn broadcast(&mut self, message: &M) -> usize {
        let handles: Vec<ObserverHandle<M>> = self.observers.values().cloned().collect();
        let mut delivered = 0;
        let mut dead = Vec::new();

        for handle in &handles {
            if handle.send(message.clone()) {
                delivered += 1;
            } else {
                dead.push(handle.id);
            }
        }

        for id in dead {
            warn!(observer = %id, "Dropping observer with closed connection");
            metrics::counter!("atomgraph_observers_dropped_total").increment(1);
            self.deregister(id);
        }

        delivered
    }

    /// Drop every handle. Connection tasks see their queue end and close.
    pub fn close_all(&mut self) -> usize {
        let count = self.observers.len();
        self.observers.clear();
        metrics::gauge!("atomgraph_observers_connected").set(0.0);
        count
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_observer() {
        let mut registry = ObserverRegistry::new();
        let (h1, mut r1) = observer_channel::<u32>();
        let (h2, mut r2) = observer_channel::<u32>();
        registry.register(h1);
        registry.register(h2);

        assert_eq!(registry.broadcast(&7), 2);
        assert_eq!(r1.recv().await, Some(7));
        assert_eq!(r2.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_closed_observer_is_isolated_and_dropped() {
        let mut registry = ObserverRegistry::new();
        let (h1, r1) = observer_channel::<u32>();
        let (h2, mut r2) = observer_channel::<u32>();
        let dead_id = registry.register(h1);
        registry.register(h2);
        drop(r1);

        assert_eq!(registry.broadcast(&1), 1);
        assert!(!registry.contains(dead_id));
        assert_eq!(registry.len(), 1);
        assert_eq!(r2.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_close_all_ends_receivers() {
        let mut registry = ObserverRegistry::new();
        let (h1, mut r1) = observer_channel::<u32>();
        registry.register(h1);

        assert_eq!(registry.close_all(), 1);
        assert!(registry.is_empty());
        assert_eq!(r1.recv().await, None);
    }

    #[test]
    fn test_slow_observer_queue_grows_without_blocking() {
        let mut registry = ObserverRegistry::new();
        let (h1, r1) = observer_channel::<u32>();
        registry.register(h1);

        for i in 0..10_000 {
            assert_eq!(registry.broadcast(&i), 1);
        }
        assert_eq!(r1.len(), 10_000);
    }
}
