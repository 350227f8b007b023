// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Network-facing roles and their lifecycle phases.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTROL_PORT: u16 = 8090;
pub const DEFAULT_GRAPH_PORT: u16 = 3000;

/// Environment flag telling a role process not to launch sibling roles
pub const NO_AUTOLAUNCH_ENV: &str = "ATOMGRAPH_NO_AUTOLAUNCH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Command surface in front of the reasoning service
    Control,
    /// Atom graph visualization and observer fan-out
    Graph,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Control, Role::Graph];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Control => "control",
            Role::Graph => "graph",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Role::Control => DEFAULT_CONTROL_PORT,
            Role::Graph => DEFAULT_GRAPH_PORT,
        }
    }

    /// The CLI subcommand that runs this role as its own process
    pub fn subcommand(&self) -> &'static str {
        match self {
            Role::Control => "control-server",
            Role::Graph => "graph-server",
        }
    }

    /// Losing the primary role brings the whole launch down; any other role
    /// only degrades it.
    pub fn is_primary(&self) -> bool {
        matches!(self, Role::Control)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of one role instance.
///
/// ```text
/// Unstarted --start()--> Running --stop()--> Stopped
///     |
///     +--start(), port owned elsewhere--> Deferred
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolePhase {
    Unstarted,
    Running,
    Deferred,
    Stopped,
}

/// true when `ATOMGRAPH_NO_AUTOLAUNCH` is set to a truthy value
pub fn autolaunch_disabled() -> bool {
    std::env::var(NO_AUTOLAUNCH_ENV)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
