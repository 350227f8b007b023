// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Control role HTTP surface: `GET /health` and the `GET /ws` envelope channel.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::application::control::ControlService;
use crate::application::role_server::RoleService;
use crate::infrastructure::observer_registry::observer_channel;
use crate::presentation::observer_bridge;

pub struct ControlApi {
    service: Arc<ControlService>,
    started_at: Instant,
}

impl ControlApi {
    pub fn new(service: Arc<ControlService>) -> Self {
        Self {
            service,
            started_at: Instant::now(),
        }
    }

    pub fn service(&self) -> &Arc<ControlService> {
        &self.service
    }
}

impl RoleService for ControlApi {
    fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(channel_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    fn close_observers(&self) -> usize {
        self.service.close_observers()
    }
}

async fn health_handler(State(api): State<Arc<ControlApi>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "role": "control",
        "uptime_seconds": api.started_at.elapsed().as_secs(),
        "observers": api.service.observer_count(),
    }))
}

async fn channel_handler(ws: WebSocketUpgrade, State(api): State<Arc<ControlApi>>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (handle, receiver) = observer_channel();
        let id = api.service.register(handle);
        debug!(observer = %id, "Control client connected");

        let service = api.service.clone();
        let exit = observer_bridge::pump(socket, receiver, move |text: String| {
            let service = service.clone();
            async move { service.handle_text(&text).await }
        })
        .await;

        api.service.deregister(id);
        debug!(observer = %id, ?exit, "Control client disconnected");
    })
}
