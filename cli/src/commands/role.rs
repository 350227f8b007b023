// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Role process entry points: `atomgraph graph-server` and
//! `atomgraph control-server`.
//!
//! Both re-probe and bind their own port. Losing the port to another
//! instance is an ordinary outcome: the graph role exits 0, the control role
//! keeps serving its stdin/stdout envelope stream without a network surface.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use atomgraph_core::application::control::{run_stdio_loop, ControlService};
use atomgraph_core::application::graph_hub::GraphHub;
use atomgraph_core::application::role_server::RoleServer;
use atomgraph_core::domain::atom_sink::AtomSink;
use atomgraph_core::domain::node_config::CoordinatorConfig;
use atomgraph_core::domain::role::{autolaunch_disabled, Role};
use atomgraph_core::infrastructure::graph_client::HttpGraphClient;
use atomgraph_core::presentation::{ControlApi, GraphApi};

use super::{resolve_config, GlobalOptions};
use crate::supervisor::{shutdown_signal, LaunchContext, RoleLaunch, Supervisor};

fn role_config(
    options: &GlobalOptions,
    role: Role,
    port: Option<u16>,
    visualize: bool,
) -> Result<CoordinatorConfig> {
    let mut config = resolve_config(options, visualize)?;
    if let Some(port) = port {
        match role {
            Role::Control => config.control.port = port,
            Role::Graph => config.graph.port = port,
        }
        config.validate().context("Invalid configuration")?;
    }
    Ok(config)
}

/// Run the graph role until SIGINT/SIGTERM. Returns the process exit code.
pub async fn graph_server(options: &GlobalOptions, port: Option<u16>) -> Result<i32> {
    let config = role_config(options, Role::Graph, port, false)?;

    let hub = Arc::new(GraphHub::default());
    let mut server = RoleServer::new(Role::Graph, config.graph.port, Arc::new(GraphApi::new(hub)))
        .with_host(config.bind_host.clone())
        .with_stop_grace(config.role.stop_grace());

    if !server.start().await.context("Failed to start graph role")? {
        return Ok(0);
    }

    shutdown_signal().await;
    info!(role = "graph", "Shutdown signal received");
    server.stop().await;
    Ok(0)
}

/// Run the control role until stdin closes or a signal arrives.
pub async fn control_server(
    options: &GlobalOptions,
    port: Option<u16>,
    visualize: bool,
) -> Result<i32> {
    let config = role_config(options, Role::Control, port, visualize)?;

    let sink: Arc<dyn AtomSink> = if config.graph.enabled {
        Arc::new(
            HttpGraphClient::new(config.graph.port, config.probe.clone())
                .context("Failed to build graph role client")?,
        )
    } else {
        info!(role = "control", "Visualization not requested, keeping atoms in process");
        Arc::new(GraphHub::default())
    };

    let service = Arc::new(ControlService::new(sink));
    let mut server = RoleServer::new(
        Role::Control,
        config.control.port,
        Arc::new(ControlApi::new(service.clone())),
    )
    .with_host(config.bind_host.clone())
    .with_stop_grace(config.role.stop_grace());

    if !server.start().await.context("Failed to start control role")? {
        info!(
            role = "control",
            port = config.control.port,
            "Control port owned by another instance, serving stdin only"
        );
    }

    // Only spawn the graph child once nothing above can bail out early.
    let mut nested = None;
    if config.graph.enabled && !autolaunch_disabled() {
        nested = Some(autolaunch_graph(options, &config).await);
    }

    let result = tokio::select! {
        handled = run_stdio_loop(&service, tokio::io::stdin(), tokio::io::stdout()) => handled.map(|_| ()),
        _ = shutdown_signal() => {
            info!(role = "control", "Shutdown signal received");
            Ok(())
        }
    };

    server.stop().await;
    if let Some(mut supervisor) = nested {
        supervisor.shutdown().await;
    }

    result.context("Control input stream failed")?;
    Ok(0)
}

/// Run the spawn decision for the graph role from a standalone control
/// process. Failures only degrade the control role.
async fn autolaunch_graph(options: &GlobalOptions, config: &CoordinatorConfig) -> Supervisor {
    let mut supervisor = Supervisor::new(config.supervisor.shutdown_grace());
    let context = LaunchContext {
        config_path: options.config_path.clone(),
        log_level: options.log_level.clone(),
        control_port: Some(config.control.port),
        graph_port: Some(config.graph.port),
        visualize: true,
    };

    let decision = match RoleLaunch::for_current_exe(Role::Graph, config.graph.port, &context) {
        Ok(launch) => supervisor.launch(launch).await,
        Err(e) => Err(e),
    };

    match decision {
        Ok(decision) => info!(role = "graph", ?decision, "Graph role auto-launch"),
        Err(e) => warn!(role = "graph", error = %e, "Graph role auto-launch failed, continuing without it"),
    }
    supervisor
}
