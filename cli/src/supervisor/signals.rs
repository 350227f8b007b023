// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use tokio::signal;

/// Resolves on the first SIGINT (Ctrl+C) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Ask a child to terminate. Returns false if the signal could not be
/// delivered (usually because the process is already gone).
#[cfg(unix)]
pub fn request_termination(pid: u32) -> bool {
    send_signal(pid, libc::SIGTERM)
}

/// SIGKILL, for children that must not outlive the supervisor.
#[cfg(unix)]
pub fn kill(pid: u32) -> bool {
    send_signal(pid, libc::SIGKILL)
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> bool {
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    unsafe { libc::kill(pid, signal) == 0 }
}

#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    send_signal(pid, 0)
}
