// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use atomgraph_core::application::control::ControlService;
use atomgraph_core::application::graph_hub::GraphHub;
use atomgraph_core::application::role_server::{RoleError, RoleServer};
use atomgraph_core::domain::atom::{Atom, AtomKind};
use atomgraph_core::domain::atom_sink::{AtomSink, SinkError};
use atomgraph_core::domain::events::Envelope;
use atomgraph_core::domain::graph::GraphSnapshot;
use atomgraph_core::domain::node_config::ProbeConfig;
use atomgraph_core::domain::role::{Role, RolePhase};
use atomgraph_core::infrastructure::graph_client::HttpGraphClient;
use atomgraph_core::infrastructure::port_probe;
use atomgraph_core::presentation::{ControlApi, GraphApi};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

fn graph_server(port: u16) -> RoleServer<GraphApi> {
    let hub = Arc::new(GraphHub::default());
    RoleServer::new(Role::Graph, port, Arc::new(GraphApi::new(hub)))
        .with_stop_grace(Duration::from_millis(500))
}

fn fast_probe() -> ProbeConfig {
    ProbeConfig {
        connect_timeout_ms: 200,
        wait_attempts: 3,
        wait_interval_ms: 50,
    }
}

#[tokio::test]
async fn test_second_instance_defers() {
    let port = free_port().await;
    let mut first = graph_server(port);
    let mut second = graph_server(port);

    assert!(port_probe::is_available(port).await);
    assert!(first.start().await.unwrap());
    assert_eq!(first.phase(), RolePhase::Running);

    assert!(!port_probe::is_available(port).await);
    assert!(!second.start().await.unwrap());
    assert_eq!(second.phase(), RolePhase::Deferred);

    // Deferred is terminal: no retry even after the owner leaves.
    first.stop().await;
    assert!(!second.start().await.unwrap());
    assert_eq!(second.phase(), RolePhase::Deferred);
}

#[tokio::test]
async fn test_concurrent_start_has_exactly_one_owner() {
    for _ in 0..5 {
        let port = free_port().await;
        let mut a = graph_server(port);
        let mut b = graph_server(port);

        let (ra, rb) = tokio::join!(a.start(), b.start());
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        assert!(ra ^ rb, "exactly one instance must own the port");
        let phases = [a.phase(), b.phase()];
        assert!(phases.contains(&RolePhase::Running));
        assert!(phases.contains(&RolePhase::Deferred));
        assert!(!port_probe::is_available(port).await);

        a.stop().await;
        b.stop().await;
    }
}

#[tokio::test]
async fn test_stop_releases_port_and_is_idempotent() {
    let port = free_port().await;
    let mut server = graph_server(port);

    assert!(server.start().await.unwrap());
    assert!(port_probe::can_connect(port, Duration::from_millis(500)).await);

    server.stop().await;
    assert_eq!(server.phase(), RolePhase::Stopped);
    assert!(port_probe::is_available(port).await);

    server.stop().await;
    assert_eq!(server.phase(), RolePhase::Stopped);

    let err = server.start().await.unwrap_err();
    assert!(matches!(err, RoleError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_stop_on_deferred_and_unstarted_is_noop() {
    let port = free_port().await;
    let mut owner = graph_server(port);
    let mut deferred = graph_server(port);
    let mut unstarted = graph_server(port);

    owner.start().await.unwrap();
    deferred.start().await.unwrap();

    deferred.stop().await;
    assert_eq!(deferred.phase(), RolePhase::Deferred);
    unstarted.stop().await;
    assert_eq!(unstarted.phase(), RolePhase::Stopped);

    assert!(owner.is_running());
    owner.stop().await;
}

#[tokio::test]
async fn test_stop_closes_observers() {
    let port = free_port().await;
    let hub = Arc::new(GraphHub::default());
    let mut server = RoleServer::new(Role::Graph, port, Arc::new(GraphApi::new(hub.clone())));
    server.start().await.unwrap();

    let mut sub = hub.subscribe();
    assert_eq!(hub.observer_count(), 1);

    server.stop().await;
    assert_eq!(hub.observer_count(), 0);

    // Snapshot still queued, then the queue ends.
    assert!(sub.receiver.recv().await.is_some());
    assert!(sub.receiver.recv().await.is_none());
}

#[tokio::test]
async fn test_late_joiner_snapshot_over_http() {
    let port = free_port().await;
    let hub = Arc::new(GraphHub::default());
    let mut server = RoleServer::new(Role::Graph, port, Arc::new(GraphApi::new(hub.clone())));
    assert!(server.start().await.unwrap());

    hub.publish(
        Atom::new("a1", AtomKind::Premise, "")
            .with_confidence(0.9)
            .with_verified(false),
    );
    hub.publish(
        Atom::new("a2", AtomKind::Reasoning, "")
            .with_dependencies(["a1"])
            .with_confidence(0.7),
    );

    let body: serde_json::Value = reqwest::get(format!("http://127.0.0.1:{}/api/atoms", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["atomOrder"], json!(["a1", "a2"]));
    assert_eq!(body["atoms"][1]["dependencies"], json!(["a1"]));
    assert_eq!(body["atoms"][1]["kind"], "reasoning");

    server.stop().await;
}

#[tokio::test]
async fn test_control_forwards_to_graph_role_over_http() {
    let graph_port = free_port().await;
    let hub = Arc::new(GraphHub::default());
    let mut graph = RoleServer::new(Role::Graph, graph_port, Arc::new(GraphApi::new(hub.clone())));
    assert!(graph.start().await.unwrap());

    let client = HttpGraphClient::new(graph_port, fast_probe()).unwrap();
    let control = ControlService::new(Arc::new(client));

    let reply = control
        .handle(Envelope::new(
            "atom",
            json!({"id": "a1", "kind": "premise", "dependencies": ["zz"], "confidence": 0.9}),
        ))
        .await;
    assert_eq!(reply.kind, "atom-accepted");
    assert_eq!(hub.snapshot().atom_order, ["a1"]);

    let reply = control.handle(Envelope::new("snapshot", json!(null))).await;
    assert_eq!(reply.kind, "atoms-update");
    let snapshot: GraphSnapshot = serde_json::from_value(reply.data).unwrap();
    assert_eq!(snapshot.atoms[0].dependencies, vec!["zz"]);

    graph.stop().await;
}

#[tokio::test]
async fn test_graph_client_reports_missing_peer() {
    let port = free_port().await;
    let client = HttpGraphClient::new(port, fast_probe()).unwrap();

    let err = client
        .publish_atom(Atom::new("a1", AtomKind::Premise, ""))
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::Unavailable { port: p } if p == port));
}

#[tokio::test]
async fn test_control_role_defers_independently() {
    let port = free_port().await;
    let sink = Arc::new(GraphHub::default());
    let api = || Arc::new(ControlApi::new(Arc::new(ControlService::new(sink.clone()))));

    let mut owner = RoleServer::new(Role::Control, port, api());
    let mut other = RoleServer::new(Role::Control, port, api());

    assert!(owner.start().await.unwrap());
    assert!(!other.start().await.unwrap());

    // The deferred instance still handles envelopes through its service.
    let reply = other.service().service().handle(Envelope::new("ping", json!(1))).await;
    assert_eq!(reply.kind, "pong");

    owner.stop().await;
}
