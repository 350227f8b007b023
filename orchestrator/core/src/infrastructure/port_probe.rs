// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Port Prober
//!
//! Answers two different questions that callers must keep apart:
//!
//! - [`is_available`]: could *I* bind this port right now?
//! - [`can_connect`]: is *someone* accepting connections on it right now?
//!
//! A port can be bindable with nobody serving (owner just exited) or taken
//! with nobody answering (owner hung). Only the first question decides
//! ownership; the second is for callers that need a live peer.
//!
//! Probing is advisory. The OS still arbitrates the real bind, so a `true`
//! from [`is_available`] can be stale by the time the caller binds.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Try to bind `port` on all interfaces and release it immediately.
///
/// Only "address in use" counts as unavailable. Any other bind failure
/// (permissions, reserved port, ...) is reported as available so that an
/// ambiguous probe never blocks a legitimate start; the real bind will
/// surface the error if there is one.
pub async fn is_available(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(e) if e.kind() == ErrorKind::AddrInUse => {
            debug!(port, "Port probe: address in use");
            false
        }
        Err(e) => {
            warn!(port, error = %e, "Port probe failed for a reason other than address in use, assuming available");
            true
        }
    }
}

/// TCP connect to `127.0.0.1:port` bounded by `connect_timeout`
pub async fn can_connect(port: u16, connect_timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => true,
        Ok(Err(e)) => {
            debug!(port, error = %e, "Port probe: connect refused");
            false
        }
        Err(_) => {
            debug!(port, timeout_ms = connect_timeout.as_millis() as u64, "Port probe: connect timed out");
            false
        }
    }
}

/// Poll [`can_connect`] up to `max_attempts` times, sleeping `interval`
/// between attempts. Returns on the first success.
pub async fn wait_for_server(port: u16, max_attempts: u32, interval: Duration) -> bool {
    wait_for_server_with_timeout(port, max_attempts, interval, DEFAULT_CONNECT_TIMEOUT).await
}

pub async fn wait_for_server_with_timeout(
    port: u16,
    max_attempts: u32,
    interval: Duration,
    connect_timeout: Duration,
) -> bool {
    for attempt in 1..=max_attempts {
        if can_connect(port, connect_timeout).await {
            debug!(port, attempt, "Server is accepting connections");
            return true;
        }
        if attempt < max_attempts {
            sleep(interval).await;
        }
    }

    debug!(port, max_attempts, "Server did not come up");
    false
}
