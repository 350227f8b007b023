// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `atomgraph status`: report who holds each role's port. Read only.

use anyhow::Result;
use colored::Colorize;
use std::time::Duration;

use atomgraph_core::domain::role::Role;
use atomgraph_core::infrastructure::port_probe;

use super::{resolve_config, GlobalOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Accepting connections
    Serving,
    /// Taken, but nobody answers
    BoundNotResponding,
    Free,
}

impl std::fmt::Display for PortState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortState::Serving => f.write_str("serving"),
            PortState::BoundNotResponding => f.write_str("bound, not responding"),
            PortState::Free => f.write_str("free"),
        }
    }
}

pub async fn probe_port(port: u16, connect_timeout: Duration) -> PortState {
    if port_probe::can_connect(port, connect_timeout).await {
        PortState::Serving
    } else if !port_probe::is_available(port).await {
        PortState::BoundNotResponding
    } else {
        PortState::Free
    }
}

pub async fn run(options: &GlobalOptions) -> Result<i32> {
    let config = resolve_config(options, false)?;

    for role in Role::ALL {
        let port = config.port_for(role);
        let state = probe_port(port, config.probe.connect_timeout()).await;
        let label = match state {
            PortState::Serving => state.to_string().green(),
            PortState::BoundNotResponding => state.to_string().yellow(),
            PortState::Free => state.to_string().dimmed(),
        };
        println!("{:<8} {:>5}  {}", role.as_str(), port, label);
    }

    Ok(0)
}
