// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Instance Supervisor
//!
//! Spawns one child process per role and watches them. The Port Prober is the
//! only input to the spawn decision:
//!
//! - role not requested: skipped, the port is never looked at
//! - port free: spawn the role process (which re-probes before it binds)
//! - port taken: an existing instance is reused, nothing is spawned
//!
//! The control role is primary. Its exit, for any reason, tears down every
//! other child. A missing or exited graph role only degrades the launch.
//!
//! Teardown is collect-and-continue: every tracked child gets a termination
//! request, a child that ignores it is killed after the grace period, and the
//! whole teardown is bounded by one deadline.

mod signals;

pub use signals::shutdown_signal;

use std::ffi::OsString;
use std::future::Future;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use atomgraph_core::domain::role::{Role, NO_AUTOLAUNCH_ENV};
use atomgraph_core::infrastructure::port_probe;

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Extra time allowed on top of the grace period for SIGKILL to land
const KILL_ALLOWANCE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn {role} role process '{program}': {source}")]
    Spawn {
        role: Role,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot locate the atomgraph executable: {0}")]
    Exe(#[source] std::io::Error),
}

/// Arguments every role process inherits from the supervisor
#[derive(Debug, Clone, Default)]
pub struct LaunchContext {
    pub config_path: Option<PathBuf>,
    pub log_level: Option<String>,
    /// Resolved ports, forwarded so every role agrees on both of them
    pub control_port: Option<u16>,
    pub graph_port: Option<u16>,
    /// Tells the control role to forward atoms to the graph role
    pub visualize: bool,
}

/// How to start the process for one role
#[derive(Debug, Clone)]
pub struct RoleLaunch {
    pub role: Role,
    pub port: u16,
    pub enabled: bool,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
    /// Hand the supervisor's stdin/stdout to the child
    pub attach_stdio: bool,
}

impl RoleLaunch {
    pub fn new(role: Role, port: u16, program: impl Into<PathBuf>) -> Self {
        Self {
            role,
            port,
            enabled: true,
            program: program.into(),
            args: Vec::new(),
            env: vec![(NO_AUTOLAUNCH_ENV.to_string(), "1".to_string())],
            attach_stdio: role.is_primary(),
        }
    }

    /// Re-exec the running binary as `atomgraph <role>-server --port N`
    pub fn for_current_exe(
        role: Role,
        port: u16,
        context: &LaunchContext,
    ) -> Result<Self, SupervisorError> {
        let exe = std::env::current_exe().map_err(SupervisorError::Exe)?;
        let mut launch = Self::new(role, port, exe);

        if let Some(config) = &context.config_path {
            launch = launch.arg("--config").arg(config);
        }
        if let Some(level) = &context.log_level {
            launch = launch.arg("--log-level").arg(level);
        }
        if let Some(control_port) = context.control_port {
            launch = launch.arg("--control-port").arg(control_port.to_string());
        }
        if let Some(graph_port) = context.graph_port {
            launch = launch.arg("--graph-port").arg(graph_port.to_string());
        }

        launch = launch
            .arg(role.subcommand())
            .arg("--port")
            .arg(port.to_string());
        if role == Role::Control && context.visualize {
            launch = launch.arg("--visualize");
        }
        Ok(launch)
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if self.attach_stdio {
            cmd.stdin(Stdio::inherit()).stdout(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null()).stdout(Stdio::null());
        }
        cmd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchDecision {
    Spawned { pid: Option<u32> },
    /// Another instance already owns the port
    Deferred,
    /// Role not requested
    Skipped,
    /// Spawn failed for a non-primary role
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildState {
    Monitoring,
    Terminating,
    Exited { code: i32 },
}

/// Why `run` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    Signal,
    ControlExited { code: i32 },
    NothingToSupervise,
    AllExited,
}

impl SupervisorOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorOutcome::ControlExited { code } => *code,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    pub role: Role,
    pub pid: Option<u32>,
    /// Exit code, 1 when the child died from a signal
    pub code: i32,
    /// Ended by a termination request rather than on its own
    pub requested: bool,
}

#[derive(Debug, Default)]
pub struct TeardownReport {
    pub exited: Vec<ChildExit>,
    /// Children whose watcher had to be abandoned at the deadline
    pub abandoned: Vec<Role>,
}

struct TrackedChild {
    slot: usize,
    role: Role,
    pid: Option<u32>,
    state: ChildState,
    terminate: Option<oneshot::Sender<Duration>>,
    watcher: JoinHandle<ChildExit>,
}

pub struct Supervisor {
    children: Vec<TrackedChild>,
    exit_tx: mpsc::UnboundedSender<(usize, ChildExit)>,
    exit_rx: mpsc::UnboundedReceiver<(usize, ChildExit)>,
    grace: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(DEFAULT_SHUTDOWN_GRACE)
    }
}

impl Supervisor {
    pub fn new(grace: Duration) -> Self {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        Self {
            children: Vec::new(),
            exit_tx,
            exit_rx,
            grace,
        }
    }

    /// Children that have not exited yet
    pub fn live_count(&self) -> usize {
        self.children
            .iter()
            .filter(|c| !matches!(c.state, ChildState::Exited { .. }))
            .count()
    }

    pub fn children(&self) -> Vec<(Role, Option<u32>, ChildState)> {
        self.children
            .iter()
            .map(|c| (c.role, c.pid, c.state))
            .collect()
    }

    /// Decide and, if the port is free, spawn the process for one role
    pub async fn launch(&mut self, launch: RoleLaunch) -> Result<LaunchDecision, SupervisorError> {
        let role = launch.role;

        if !launch.enabled {
            debug!(role = %role, "Role not requested, skipping");
            return Ok(LaunchDecision::Skipped);
        }

        if !port_probe::is_available(launch.port).await {
            info!(
                role = %role,
                port = launch.port,
                "Port in use, reusing the existing instance"
            );
            metrics::counter!("atomgraph_role_deferrals_total", "role" => role.as_str())
                .increment(1);
            return Ok(LaunchDecision::Deferred);
        }

        let child = launch
            .command()
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                role,
                program: launch.program.display().to_string(),
                source,
            })?;

        let pid = child.id();
        let slot = self.children.len();
        let (terminate_tx, terminate_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch(
            slot,
            role,
            child,
            terminate_rx,
            self.exit_tx.clone(),
        ));

        metrics::counter!("atomgraph_children_spawned_total", "role" => role.as_str())
            .increment(1);
        info!(role = %role, port = launch.port, pid = ?pid, "Spawned role process");

        self.children.push(TrackedChild {
            slot,
            role,
            pid,
            state: ChildState::Monitoring,
            terminate: Some(terminate_tx),
            watcher,
        });
        Ok(LaunchDecision::Spawned { pid })
    }

    /// Launch roles in order. A primary role that fails to spawn aborts the
    /// launch; any other failure is logged and recorded as `Failed`.
    pub async fn launch_all(
        &mut self,
        launches: Vec<RoleLaunch>,
    ) -> Result<Vec<(Role, LaunchDecision)>, SupervisorError> {
        let mut decisions = Vec::with_capacity(launches.len());

        for launch in launches {
            let role = launch.role;
            match self.launch(launch).await {
                Ok(decision) => decisions.push((role, decision)),
                Err(e) if role.is_primary() => {
                    error!(role = %role, error = %e, "Primary role failed to spawn");
                    return Err(e);
                }
                Err(e) => {
                    warn!(role = %role, error = %e, "Role failed to spawn, continuing degraded");
                    decisions.push((role, LaunchDecision::Failed));
                }
            }
        }

        Ok(decisions)
    }

    /// Watch children until `shutdown` resolves, the control role exits, or
    /// nothing is left running.
    pub async fn run<F>(&mut self, shutdown: F) -> SupervisorOutcome
    where
        F: Future<Output = ()>,
    {
        if self.live_count() == 0 {
            info!("No role processes spawned, nothing to supervise");
            return SupervisorOutcome::NothingToSupervise;
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Termination signal received");
                    return SupervisorOutcome::Signal;
                }
                Some((slot, exit)) = self.exit_rx.recv() => {
                    self.mark_exited(slot, exit.code);

                    if exit.role.is_primary() {
                        warn!(role = %exit.role, code = exit.code, "Control role exited, tearing down");
                        return SupervisorOutcome::ControlExited { code: exit.code };
                    }

                    warn!(role = %exit.role, code = exit.code, "Role process exited, continuing degraded");
                    if self.live_count() == 0 {
                        return SupervisorOutcome::AllExited;
                    }
                }
            }
        }
    }

    fn mark_exited(&mut self, slot: usize, code: i32) {
        if let Some(child) = self.children.iter_mut().find(|c| c.slot == slot) {
            child.state = ChildState::Exited { code };
            child.terminate = None;
        }
    }

    /// Terminate every tracked child. Never fails; problems are logged and
    /// reported.
    pub async fn shutdown(&mut self) -> TeardownReport {
        for child in &mut self.children {
            if let Some(terminate) = child.terminate.take() {
                child.state = ChildState::Terminating;
                if terminate.send(self.grace).is_err() {
                    debug!(role = %child.role, "Child already exited");
                }
            }
        }

        let deadline = Instant::now() + self.grace + KILL_ALLOWANCE;
        let mut report = TeardownReport::default();

        for child in self.children.drain(..) {
            let mut watcher = child.watcher;
            match timeout_at(deadline, &mut watcher).await {
                Ok(Ok(exit)) => report.exited.push(exit),
                Ok(Err(e)) => {
                    warn!(role = %child.role, error = %e, "Child watcher failed");
                    report.abandoned.push(child.role);
                }
                Err(_) => {
                    // Aborting drops the Child, and kill_on_drop sends SIGKILL.
                    warn!(role = %child.role, pid = ?child.pid, "Child did not exit before the teardown deadline");
                    watcher.abort();
                    report.abandoned.push(child.role);
                }
            }
        }

        info!(
            exited = report.exited.len(),
            abandoned = report.abandoned.len(),
            "Teardown complete"
        );
        report
    }
}

/// A supervisor dropped without `shutdown` (an early error return, or a
/// `process::exit` that skips the runtime) still must not leave role
/// processes behind. Children already drained by `shutdown` are not touched.
impl Drop for Supervisor {
    fn drop(&mut self) {
        while let Ok((slot, exit)) = self.exit_rx.try_recv() {
            self.mark_exited(slot, exit.code);
        }

        for child in &self.children {
            if matches!(child.state, ChildState::Exited { .. }) {
                continue;
            }
            warn!(role = %child.role, pid = ?child.pid, "Supervisor dropped with live child, killing");

            #[cfg(unix)]
            if let Some(pid) = child.pid {
                signals::kill(pid);
            }

            #[cfg(not(unix))]
            child.watcher.abort();
        }
    }
}

async fn watch(
    slot: usize,
    role: Role,
    mut child: Child,
    mut terminate: oneshot::Receiver<Duration>,
    exits: mpsc::UnboundedSender<(usize, ChildExit)>,
) -> ChildExit {
    let pid = child.id();

    let (status, requested) = tokio::select! {
        status = child.wait() => (status, false),
        Ok(grace) = &mut terminate => (terminate_child(role, &mut child, grace).await, true),
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!(role = %role, error = %e, "Failed to collect child exit status");
            1
        }
    };

    debug!(role = %role, pid = ?pid, code, requested, "Role process exited");
    let exit = ChildExit {
        role,
        pid,
        code,
        requested,
    };
    let _ = exits.send((slot, exit));
    exit
}

async fn terminate_child(
    role: Role,
    child: &mut Child,
    grace: Duration,
) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        if !signals::request_termination(pid) && signals::process_exists(pid) {
            warn!(role = %role, pid, "Could not deliver SIGTERM");
        }
    }

    #[cfg(not(unix))]
    child.start_kill()?;

    match timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(
                role = %role,
                grace_ms = grace.as_millis() as u64,
                "Child ignored termination request, killing"
            );
            child.kill().await?;
            child.wait().await
        }
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(1)
}
