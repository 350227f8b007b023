// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Wire messages for both push channels.
//!
//! Everything on the wire is a `{type, data}` envelope. The graph role only
//! ever sends; the control role reads and writes the same shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::atom::{Atom, AtomId};
use super::graph::GraphSnapshot;

/// Messages pushed to graph observers.
///
/// Per connection the order is: one `atoms-update`, then for each publish an
/// `atom-update` followed by an `atoms-order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GraphEvent {
    AtomsUpdate(GraphSnapshot),
    AtomUpdate(Atom),
    AtomsOrder(Vec<AtomId>),
}

impl GraphEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            GraphEvent::AtomsUpdate(_) => "atoms-update",
            GraphEvent::AtomUpdate(_) => "atom-update",
            GraphEvent::AtomsOrder(_) => "atoms-order",
        }
    }
}

/// Generic envelope on the control channel.
///
/// `data` is kept as raw JSON: only the handler for a given `type` decides
/// what it must look like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(
            envelope_types::ERROR,
            serde_json::json!({ "message": message.into() }),
        )
    }

    /// Parse one frame; anything that is not a `{type, data}` object yields
    /// `None`.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(text).ok()? {
            Value::Object(map) if map.get("type").map(Value::is_string).unwrap_or(false) => {
                serde_json::from_value(Value::Object(map)).ok()
            }
            _ => None,
        }
    }
}

/// Envelope `type` values understood or emitted by the control role
pub mod envelope_types {
    pub const ATOM: &str = "atom";
    pub const SNAPSHOT: &str = "snapshot";
    pub const PING: &str = "ping";

    pub const PONG: &str = "pong";
    pub const ATOM_ACCEPTED: &str = "atom-accepted";
    pub const ATOM_PUBLISHED: &str = "atom-published";
    pub const ATOMS_UPDATE: &str = "atoms-update";
    pub const ERROR: &str = "error";
}
