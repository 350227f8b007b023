// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod graph_client;
pub mod observer_registry;
pub mod port_probe;

pub use graph_client::HttpGraphClient;
pub use observer_registry::{observer_channel, ObserverHandle, ObserverId, ObserverReceiver, ObserverRegistry};
