// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `atomgraph start`: run the Instance Supervisor for every role.

use anyhow::Result;
use colored::Colorize;
use tracing::error;

use atomgraph_core::domain::role::Role;

use super::{resolve_config, GlobalOptions};
use crate::supervisor::{
    shutdown_signal, LaunchContext, LaunchDecision, RoleLaunch, Supervisor,
};

/// Returns the exit code for the supervisor process.
pub async fn run(options: &GlobalOptions, visualize: bool) -> Result<i32> {
    let config = resolve_config(options, visualize)?;

    let context = LaunchContext {
        config_path: options.config_path.clone(),
        log_level: options.log_level.clone(),
        control_port: Some(config.control.port),
        graph_port: Some(config.graph.port),
        visualize: config.graph.enabled,
    };

    let launches = Role::ALL
        .iter()
        .map(|&role| {
            RoleLaunch::for_current_exe(role, config.port_for(role), &context)
                .map(|launch| launch.enabled(config.enabled(role)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut supervisor = Supervisor::new(config.supervisor.shutdown_grace());
    let decisions = match supervisor.launch_all(launches).await {
        Ok(decisions) => decisions,
        Err(e) => {
            error!(error = %e, "Launch aborted");
            eprintln!("{}", format!("✗ {}", e).red());
            supervisor.shutdown().await;
            return Ok(1);
        }
    };

    for (role, decision) in &decisions {
        let port = config.port_for(*role);
        let line = match decision {
            LaunchDecision::Spawned { pid } => format!(
                "✓ {} role started on port {} (PID: {})",
                role,
                port,
                pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into())
            )
            .green(),
            LaunchDecision::Deferred => {
                format!("• {} role already running on port {}, reusing it", role, port).cyan()
            }
            LaunchDecision::Skipped => format!("- {} role not requested", role).dimmed(),
            LaunchDecision::Failed => {
                format!("⚠ {} role failed to start, continuing without it", role).yellow()
            }
        };
        eprintln!("{}", line);
    }

    let outcome = supervisor.run(shutdown_signal()).await;
    supervisor.shutdown().await;
    Ok(outcome.exit_code())
}
