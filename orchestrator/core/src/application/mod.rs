// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod control;
pub mod graph_hub;
pub mod role_server;

pub use control::{run_stdio_loop, ControlService};
pub use graph_hub::{GraphHub, Subscription};
pub use role_server::{RoleError, RoleServer, RoleService};
