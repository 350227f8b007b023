// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the atomgraph CLI

pub mod role;
pub mod start;
pub mod status;

use anyhow::{Context, Result};
use std::path::PathBuf;

use atomgraph_core::domain::node_config::CoordinatorConfig;

/// Flags shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub control_port: Option<u16>,
    pub graph_port: Option<u16>,
}

/// Load configuration (file or discovery, then environment), apply CLI flags
/// on top and validate.
pub fn resolve_config(options: &GlobalOptions, visualize: bool) -> Result<CoordinatorConfig> {
    let mut config = CoordinatorConfig::load_or_default(options.config_path.clone())
        .context("Failed to load configuration")?;

    if let Some(port) = options.control_port {
        config.control.port = port;
    }
    if let Some(port) = options.graph_port {
        config.graph.port = port;
    }
    if visualize {
        config.graph.enabled = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}
