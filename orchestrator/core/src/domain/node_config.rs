// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordinator Configuration
//
// Defines the configuration for one atomgraph launch:
// - Port and enablement per role (control, graph)
// - Port prober timings (connect timeout, wait-for-server retries)
// - Shutdown grace periods for role servers and the supervisor
//
// Files are YAML. Discovery order and env overrides follow the same rules as
// every other host-level config in this workspace.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::role::{Role, DEFAULT_CONTROL_PORT, DEFAULT_GRAPH_PORT};

pub const CONFIG_PATH_ENV: &str = "ATOMGRAPH_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Host the role servers bind their listeners on
    pub bind_host: String,
    pub control: RoleConfig,
    /// `enabled` doubles as "visualization requested"
    pub graph: RoleConfig,
    pub probe: ProbeConfig,
    pub supervisor: SupervisorConfig,
    pub role: RoleServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    pub port: u16,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Timeout for a single `can_connect` attempt
    pub connect_timeout_ms: u64,
    /// Attempts made by `wait_for_server`
    pub wait_attempts: u32,
    /// Sleep between `wait_for_server` attempts
    pub wait_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Time a child gets to exit after SIGTERM before it is killed
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleServerConfig {
    /// Upper bound on draining the HTTP server during `stop()`
    pub stop_grace_ms: u64,
}

fn default_true() -> bool {
    true
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 1000,
            wait_attempts: 10,
            wait_interval_ms: 300,
        }
    }
}

impl ProbeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 2000,
        }
    }
}

impl SupervisorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for RoleServerConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: 2000,
        }
    }
}

impl RoleServerConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            control: RoleConfig {
                port: DEFAULT_CONTROL_PORT,
                enabled: true,
            },
            graph: RoleConfig {
                port: DEFAULT_GRAPH_PORT,
                enabled: false,
            },
            probe: ProbeConfig::default(),
            supervisor: SupervisorConfig::default(),
            role: RoleServerConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Discover configuration file using precedence order
    /// 1. ATOMGRAPH_CONFIG_PATH environment variable
    /// 2. ./atomgraph.yaml (working directory)
    /// 3. ~/.atomgraph/config.yaml (user home)
    /// 4. /etc/atomgraph/config.yaml (Unix only)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./atomgraph.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".atomgraph").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/atomgraph/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // Explicit path must load; discovered paths are best effort.
        let mut config = if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(path)?
        } else {
            tracing::debug!("No configuration file found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("ATOMGRAPH_CONTROL_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: ATOMGRAPH_CONTROL_PORT={}", port);
                    self.control.port = port;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for ATOMGRAPH_CONTROL_PORT: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("ATOMGRAPH_GRAPH_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: ATOMGRAPH_GRAPH_PORT={}", port);
                    self.graph.port = port;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for ATOMGRAPH_GRAPH_PORT: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Some(val) = lookup("ATOMGRAPH_VISUALIZE") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: ATOMGRAPH_VISUALIZE=true");
                    self.graph.enabled = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: ATOMGRAPH_VISUALIZE=false");
                    self.graph.enabled = false;
                }
                _ => tracing::warn!(
                    "Invalid value for ATOMGRAPH_VISUALIZE: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }
    }

    pub fn port_for(&self, role: Role) -> u16 {
        match role {
            Role::Control => self.control.port,
            Role::Graph => self.graph.port,
        }
    }

    pub fn enabled(&self, role: Role) -> bool {
        match role {
            Role::Control => self.control.enabled,
            Role::Graph => self.graph.enabled,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.port == 0 || self.graph.port == 0 {
            return Err(ConfigError::Invalid("role ports must be non-zero".into()));
        }

        if self.control.port == self.graph.port {
            return Err(ConfigError::Invalid(format!(
                "control and graph roles cannot share port {}",
                self.control.port
            )));
        }

        if self.probe.wait_attempts == 0 {
            return Err(ConfigError::Invalid(
                "probe.wait_attempts must be at least 1".into(),
            ));
        }

        if self.probe.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "probe.connect_timeout_ms must be at least 1".into(),
            ));
        }

        if self.bind_host.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_host cannot be empty".into()));
        }

        Ok(())
    }
}
