// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use thiserror::Error;

use super::atom::Atom;
use super::graph::GraphSnapshot;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("graph role is not reachable on port {port}")]
    Unavailable { port: u16 },

    #[error("graph role rejected the request: {0}")]
    Rejected(String),

    #[error("graph role request failed: {0}")]
    Transport(String),
}

/// Where the control role delivers atoms and reads the graph back from.
///
/// Implemented in-process by `GraphHub` and across processes by
/// `HttpGraphClient`.
#[async_trait]
pub trait AtomSink: Send + Sync {
    async fn publish_atom(&self, atom: Atom) -> Result<(), SinkError>;
    async fn snapshot(&self) -> Result<GraphSnapshot, SinkError>;
}
