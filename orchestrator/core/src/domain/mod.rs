// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain types: atoms, the graph state, roles, wire envelopes and config.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure data and invariants, no I/O

pub mod atom;
pub mod atom_sink;
pub mod events;
pub mod graph;
pub mod node_config;
pub mod role;

pub use atom::{Atom, AtomError, AtomId, AtomKind};
pub use atom_sink::{AtomSink, SinkError};
pub use events::{Envelope, GraphEvent};
pub use graph::{GraphSnapshot, GraphState, MergeOutcome};
pub use node_config::{ConfigError, CoordinatorConfig};
pub use role::{Role, RolePhase};
