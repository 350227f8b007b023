// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Atom entities - the reasoning units rendered by the graph role.
//!
//! Atoms are produced outside this crate (by the reasoning service behind the
//! control role) and only validated, stored and fanned out here. Dependencies
//! may point at atoms that have not arrived yet; nothing in the crate resolves
//! them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Opaque atom identifier assigned by the producer.
pub type AtomId = String;

/// Closed set of reasoning unit kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomKind {
    Premise,
    Reasoning,
    Hypothesis,
    Verification,
    Conclusion,
}

impl AtomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomKind::Premise => "premise",
            AtomKind::Reasoning => "reasoning",
            AtomKind::Hypothesis => "hypothesis",
            AtomKind::Verification => "verification",
            AtomKind::Conclusion => "conclusion",
        }
    }
}

impl std::fmt::Display for AtomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single reasoning unit.
///
/// `created_at` is owned by [`GraphState`](crate::domain::graph::GraphState):
/// whatever the producer sends is overwritten at insertion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Atom {
    pub id: AtomId,
    #[serde(default)]
    pub content: String,
    #[serde(alias = "type")]
    pub kind: AtomKind,
    #[serde(default)]
    pub dependencies: Vec<AtomId>,
    pub confidence: f64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error, PartialEq)]
pub enum AtomError {
    #[error("atom id cannot be empty")]
    EmptyId,

    #[error("atom {id}: confidence {value} is outside [0, 1]")]
    ConfidenceOutOfRange { id: AtomId, value: f64 },
}

impl Atom {
    pub fn new(id: impl Into<AtomId>, kind: AtomKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            kind,
            dependencies: Vec::new(),
            confidence: 1.0,
            verified: false,
            depth: None,
            created_at: None,
        }
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AtomId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Check the producer-supplied fields and normalize the dependency set.
    ///
    /// Dependencies are a set: repeats are removed, first occurrence wins.
    /// Unknown ids are left alone.
    pub fn validate(mut self) -> Result<Self, AtomError> {
        if self.id.trim().is_empty() {
            return Err(AtomError::EmptyId);
        }

        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(AtomError::ConfidenceOutOfRange {
                id: self.id,
                value: self.confidence,
            });
        }

        let mut seen = HashSet::with_capacity(self.dependencies.len());
        self.dependencies.retain(|dep| seen.insert(dep.clone()));

        Ok(self)
    }
}
