// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Role Server
//!
//! Owns the listening socket of one role and drives its lifecycle:
//!
//! | Phase | `start()` | `stop()` |
//! |-------|-----------|----------|
//! | Unstarted | probe, bind -> Running, or Deferred | -> Stopped |
//! | Running | `Ok(true)` | drain, close observers -> Stopped |
//! | Deferred | `Ok(false)` | no-op |
//! | Stopped | `InvalidTransition` | no-op |
//!
//! Probe-then-bind is only advisory. Two instances can both see the port free;
//! the OS lets exactly one bind succeed and the other lands in Deferred the
//! same way it would after a failed probe. A deferred instance never retries.

use axum::Router;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::role::{Role, RolePhase};
use crate::infrastructure::port_probe;

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("failed to bind {role} role on {addr}: {source}")]
    Bind {
        role: Role,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} role cannot start from phase {phase:?}")]
    InvalidTransition { role: Role, phase: RolePhase },
}

/// What a role exposes on its port
pub trait RoleService: Send + Sync + 'static {
    fn router(self: Arc<Self>) -> Router;

    /// Close every observer connection; returns how many were open
    fn close_observers(&self) -> usize;
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

enum Lifecycle {
    Unstarted,
    Running(RunningServer),
    Deferred,
    Stopped,
}

pub struct RoleServer<S: RoleService> {
    role: Role,
    host: String,
    port: u16,
    service: Arc<S>,
    stop_grace: Duration,
    lifecycle: Lifecycle,
}

impl<S: RoleService> RoleServer<S> {
    pub fn new(role: Role, port: u16, service: Arc<S>) -> Self {
        Self {
            role,
            host: "127.0.0.1".to_string(),
            port,
            service,
            stop_grace: DEFAULT_STOP_GRACE,
            lifecycle: Lifecycle::Unstarted,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    pub fn phase(&self) -> RolePhase {
        match self.lifecycle {
            Lifecycle::Unstarted => RolePhase::Unstarted,
            Lifecycle::Running(_) => RolePhase::Running,
            Lifecycle::Deferred => RolePhase::Deferred,
            Lifecycle::Stopped => RolePhase::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running(_))
    }

    /// Bound address while Running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.lifecycle {
            Lifecycle::Running(server) => Some(server.local_addr),
            _ => None,
        }
    }

    /// Take ownership of the port.
    ///
    /// `Ok(true)`: this instance owns the port and serves on it.
    /// `Ok(false)`: another owner holds the port; this instance is Deferred.
    /// `Err`: the bind failed for a reason other than the port being in use.
    pub async fn start(&mut self) -> Result<bool, RoleError> {
        match self.lifecycle {
            Lifecycle::Unstarted => {}
            Lifecycle::Running(_) => return Ok(true),
            Lifecycle::Deferred => return Ok(false),
            Lifecycle::Stopped => {
                return Err(RoleError::InvalidTransition {
                    role: self.role,
                    phase: RolePhase::Stopped,
                })
            }
        }

        if !port_probe::is_available(self.port).await {
            self.defer("port probe reports address in use");
            return Ok(false);
        }

        let addr = format!("{}:{}", self.host, self.port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                self.defer("lost the bind race to another instance");
                return Ok(false);
            }
            Err(source) => {
                return Err(RoleError::Bind {
                    role: self.role,
                    addr,
                    source,
                })
            }
        };

        let local_addr = listener.local_addr().map_err(|source| RoleError::Bind {
            role: self.role,
            addr: addr.clone(),
            source,
        })?;

        let shutdown = CancellationToken::new();
        let app = Arc::clone(&self.service).router();
        let signal = shutdown.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(signal)
                .await
        });

        info!(role = %self.role, %local_addr, "Role server running");
        self.lifecycle = Lifecycle::Running(RunningServer {
            local_addr,
            shutdown,
            task,
        });
        Ok(true)
    }

    fn defer(&mut self, reason: &str) {
        info!(
            role = %self.role,
            port = self.port,
            reason,
            "Another instance owns the port, deferring to it"
        );
        metrics::counter!("atomgraph_role_deferrals_total", "role" => self.role.as_str())
            .increment(1);
        self.lifecycle = Lifecycle::Deferred;
    }

    /// Release the port and every observer connection.
    ///
    /// Idempotent, and bounded by the stop grace period: a server that does
    /// not drain in time is aborted. Failures are logged, never returned.
    pub async fn stop(&mut self) {
        let running = match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Running(server) => server,
            Lifecycle::Deferred => {
                self.lifecycle = Lifecycle::Deferred;
                return;
            }
            Lifecycle::Unstarted | Lifecycle::Stopped => return,
        };

        info!(role = %self.role, addr = %running.local_addr, "Stopping role server");
        running.shutdown.cancel();
        let closed = self.service.close_observers();
        debug!(role = %self.role, closed, "Closed observer connections");

        let mut task = running.task;
        match timeout(self.stop_grace, &mut task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(role = %self.role, error = %e, "Role server exited with error"),
            Ok(Err(e)) => warn!(role = %self.role, error = %e, "Role server task failed"),
            Err(_) => {
                warn!(
                    role = %self.role,
                    grace_ms = self.stop_grace.as_millis() as u64,
                    "Role server did not drain in time, aborting"
                );
                task.abort();
                let _ = task.await;
            }
        }

        info!(role = %self.role, port = self.port, "Role server stopped");
    }
}

impl<S: RoleService> Drop for RoleServer<S> {
    fn drop(&mut self) {
        if let Lifecycle::Running(server) = &self.lifecycle {
            server.shutdown.cancel();
            server.task.abort();
        }
    }
}
