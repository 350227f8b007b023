// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use atomgraph_core::application::control::ControlService;
use atomgraph_core::application::graph_hub::GraphHub;
use atomgraph_core::application::role_server::RoleServer;
use atomgraph_core::domain::atom::{Atom, AtomKind};
use atomgraph_core::domain::atom_sink::{AtomSink, SinkError};
use atomgraph_core::domain::graph::GraphSnapshot;
use atomgraph_core::domain::role::Role;
use atomgraph_core::presentation::{ControlApi, GraphApi};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn connect(port: u16) -> Client {
    let (client, _) = connect_async(format!("ws://127.0.0.1:{}/ws", port))
        .await
        .unwrap();
    client
}

/// Next JSON text frame, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("no frame within 2s")
            .expect("stream ended")
            .unwrap();
        match frame {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// True once the server closed the channel: a close frame, end of stream or
/// a reset connection.
async fn closed_within(client: &mut Client, limit: Duration) -> bool {
    let wait = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    };
    timeout(limit, wait).await.is_ok()
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached within 2s");
}

#[tokio::test]
async fn test_graph_channel_snapshot_then_live_updates() {
    let port = free_port().await;
    let hub = Arc::new(GraphHub::default());
    let mut server = RoleServer::new(Role::Graph, port, Arc::new(GraphApi::new(hub.clone())))
        .with_stop_grace(Duration::from_millis(500));
    assert!(server.start().await.unwrap());

    hub.publish(Atom::new("a1", AtomKind::Premise, "given"));

    let mut client = connect(port).await;
    let first = next_json(&mut client).await;
    assert_eq!(first["type"], "atoms-update");
    assert_eq!(first["data"]["atomOrder"], json!(["a1"]));

    wait_for(|| hub.observer_count() == 1).await;
    hub.publish(
        Atom::new("a2", AtomKind::Reasoning, "so")
            .with_dependencies(["a1"])
            .with_confidence(0.8),
    );

    let update = next_json(&mut client).await;
    assert_eq!(update["type"], "atom-update");
    assert_eq!(update["data"]["id"], "a2");
    assert_eq!(update["data"]["dependencies"], json!(["a1"]));

    let order = next_json(&mut client).await;
    assert_eq!(order["type"], "atoms-order");
    assert_eq!(order["data"], json!(["a1", "a2"]));

    server.stop().await;
    assert!(closed_within(&mut client, Duration::from_secs(2)).await);
    assert_eq!(hub.observer_count(), 0);
}

#[tokio::test]
async fn test_graph_channel_disconnect_deregisters_observer() {
    let port = free_port().await;
    let hub = Arc::new(GraphHub::default());
    let mut server = RoleServer::new(Role::Graph, port, Arc::new(GraphApi::new(hub.clone())));
    assert!(server.start().await.unwrap());

    let mut client = connect(port).await;
    next_json(&mut client).await;
    wait_for(|| hub.observer_count() == 1).await;

    client.close(None).await.unwrap();
    wait_for(|| hub.observer_count() == 0).await;

    // Publishing with nobody listening is fine.
    hub.publish(Atom::new("a1", AtomKind::Premise, ""));
    assert_eq!(hub.len(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_control_channel_replies_to_sender() {
    let port = free_port().await;
    let service = Arc::new(ControlService::new(Arc::new(GraphHub::default())));
    let mut server = RoleServer::new(Role::Control, port, Arc::new(ControlApi::new(service.clone())))
        .with_stop_grace(Duration::from_millis(500));
    assert!(server.start().await.unwrap());

    let mut client = connect(port).await;
    client
        .send(Message::text(json!({"type": "ping", "data": 42}).to_string()))
        .await
        .unwrap();

    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "pong");

    server.stop().await;
    assert!(closed_within(&mut client, Duration::from_secs(2)).await);
}

/// Accepts the call and never completes it.
#[derive(Default)]
struct StalledGraph {
    entered: AtomicBool,
}

#[async_trait]
impl AtomSink for StalledGraph {
    async fn publish_atom(&self, _atom: Atom) -> Result<(), SinkError> {
        self.entered.store(true, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn snapshot(&self) -> Result<GraphSnapshot, SinkError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_stop_closes_control_channel_with_handler_pending() {
    let port = free_port().await;
    let graph = Arc::new(StalledGraph::default());
    let service = Arc::new(ControlService::new(graph.clone()));
    let mut server = RoleServer::new(Role::Control, port, Arc::new(ControlApi::new(service.clone())))
        .with_stop_grace(Duration::from_millis(300));
    assert!(server.start().await.unwrap());

    let mut client = connect(port).await;
    wait_for(|| service.observer_count() == 1).await;
    client
        .send(Message::text(
            json!({"type": "atom", "data": {"id": "a1", "kind": "premise", "confidence": 0.9}}).to_string(),
        ))
        .await
        .unwrap();
    wait_for(|| graph.entered.load(Ordering::SeqCst)).await;

    server.stop().await;
    assert!(closed_within(&mut client, Duration::from_secs(2)).await);
    wait_for(|| service.observer_count() == 0).await;
}
