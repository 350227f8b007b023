// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Graph role HTTP surface.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /` | Visualization page |
//! | `GET /health` | Liveness and counters |
//! | `GET /api/atoms` | Snapshot `{atoms, atomOrder}` |
//! | `POST /api/atoms` | Publish one atom |
//! | `GET /api/atoms/{id}` | Single atom |
//! | `GET /ws` | Observer push channel |

use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::application::graph_hub::GraphHub;
use crate::application::role_server::RoleService;
use crate::domain::atom::Atom;
use crate::domain::events::GraphEvent;
use crate::presentation::observer_bridge;

const VISUALIZER_PAGE: &str = include_str!("assets/visualizer.html");

pub struct GraphApi {
    hub: Arc<GraphHub>,
    started_at: Instant,
}

impl GraphApi {
    pub fn new(hub: Arc<GraphHub>) -> Self {
        Self {
            hub,
            started_at: Instant::now(),
        }
    }

    pub fn hub(&self) -> &Arc<GraphHub> {
        &self.hub
    }
}

impl RoleService for GraphApi {
    fn router(self: Arc<Self>) -> Router {
        router(self)
    }

    fn close_observers(&self) -> usize {
        self.hub.close_observers()
    }
}

pub fn router(api: Arc<GraphApi>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/atoms", get(snapshot_handler).post(publish_handler))
        .route("/api/atoms/{id}", get(atom_handler))
        .route("/ws", get(observer_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn index_handler() -> Html<&'static str> {
    Html(VISUALIZER_PAGE)
}

async fn health_handler(State(api): State<Arc<GraphApi>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "role": "graph",
        "uptime_seconds": api.started_at.elapsed().as_secs(),
        "observers": api.hub.observer_count(),
        "atoms": api.hub.len(),
    }))
}

async fn snapshot_handler(State(api): State<Arc<GraphApi>>) -> Response {
    Json(api.hub.snapshot()).into_response()
}

async fn atom_handler(State(api): State<Arc<GraphApi>>, Path(id): Path<String>) -> Response {
    match api.hub.get(&id) {
        Some(atom) => Json(atom).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("atom '{}' not found", id) })),
        )
            .into_response(),
    }
}

async fn publish_handler(State(api): State<Arc<GraphApi>>, Json(atom): Json<Atom>) -> Response {
    match atom.validate() {
        Ok(atom) => {
            let id = atom.id.clone();
            api.hub.publish(atom);
            (StatusCode::ACCEPTED, Json(json!({ "id": id }))).into_response()
        }
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn observer_handler(ws: WebSocketUpgrade, State(api): State<Arc<GraphApi>>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let subscription = api.hub.subscribe();
        let id = subscription.id;
        debug!(observer = %id, "Graph observer connected");

        let exit = observer_bridge::pump(socket, subscription.receiver, |_text: String| {
            std::future::ready(None::<GraphEvent>)
        })
        .await;

        api.hub.unsubscribe(id);
        debug!(observer = %id, ?exit, "Graph observer disconnected");
    })
}
