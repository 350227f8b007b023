// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for the graph role, used by the control role process.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::atom::Atom;
use crate::domain::atom_sink::{AtomSink, SinkError};
use crate::domain::graph::GraphSnapshot;
use crate::domain::node_config::ProbeConfig;
use crate::infrastructure::port_probe;

#[derive(Debug, Clone)]
pub struct HttpGraphClient {
    client: Client,
    base_url: String,
    port: u16,
    probe: ProbeConfig,
}

impl HttpGraphClient {
    pub fn new(port: u16, probe: ProbeConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: format!("http://127.0.0.1:{}", port),
            port,
            probe,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run `send` once; if the peer refused the connection, wait for it to
    /// come up and try exactly once more.
    async fn with_peer<F, Fut>(&self, send: F) -> Result<reqwest::Response, SinkError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    {
        match send().await {
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_connect() => {
                debug!(port = self.port, "Graph role not reachable, waiting for it");
            }
            Err(e) => return Err(SinkError::Transport(e.to_string())),
        }

        let up = port_probe::wait_for_server_with_timeout(
            self.port,
            self.probe.wait_attempts,
            self.probe.wait_interval(),
            self.probe.connect_timeout(),
        )
        .await;

        if !up {
            return Err(SinkError::Unavailable { port: self.port });
        }

        info!(port = self.port, "Graph role came up");
        send().await.map_err(|e| {
            if e.is_connect() {
                SinkError::Unavailable { port: self.port }
            } else {
                SinkError::Transport(e.to_string())
            }
        })
    }
}

#[async_trait]
impl AtomSink for HttpGraphClient {
    async fn publish_atom(&self, atom: Atom) -> Result<(), SinkError> {
        let url = format!("{}/api/atoms", self.base_url);
        let response = self
            .with_peer(|| self.client.post(&url).json(&atom).send())
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
                let body = response.text().await.unwrap_or_default();
                Err(SinkError::Rejected(body))
            }
            status => Err(SinkError::Transport(format!("HTTP {}", status))),
        }
    }

    async fn snapshot(&self) -> Result<GraphSnapshot, SinkError> {
        let url = format!("{}/api/atoms", self.base_url);
        let response = self.with_peer(|| self.client.get(&url).send()).await?;

        if !response.status().is_success() {
            return Err(SinkError::Transport(format!("HTTP {}", response.status())));
        }

        response
            .json::<GraphSnapshot>()
            .await
            .map_err(|e| SinkError::Transport(format!("invalid snapshot: {}", e)))
    }
}
