// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`atomgraph-core`)
//!
//! HTTP and WebSocket surface of the two roles. No coordination logic lives
//! here; state changes go through `crate::application`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`graph_api`] | HTTP/WS (Axum) | Visualization page, snapshot/publish endpoints, observer channel |
//! | [`control_api`] | HTTP/WS (Axum) | Envelope channel of the control role |
//! | [`observer_bridge`] | WS | Per-connection pump shared by both roles |

pub mod control_api;
pub mod graph_api;
pub mod observer_bridge;

pub use control_api::ControlApi;
pub use graph_api::GraphApi;
