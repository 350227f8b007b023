// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Core of atomgraph: the atom graph, the two role servers and the port
//! coordination primitives they share.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Everything a role process needs; process supervision lives
//!   in the `atomgraph` CLI crate

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
