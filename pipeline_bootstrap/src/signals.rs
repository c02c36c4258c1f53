// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! Wires SIGTERM/SIGINT/SIGHUP (Unix) or Ctrl-C (Windows) to a
//! [`ShutdownCoordinator`], spawning one task that races all installed
//! signal listeners and calls `initiate_shutdown` on whichever fires
//! first.

use crate::shutdown::ShutdownCoordinator;

#[cfg(unix)]
pub fn install(coordinator: ShutdownCoordinator) {
    use tokio::signal::unix::{signal, SignalKind};
    tokio::spawn(async move {
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut hup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        tokio::select! {
            _ = term.recv() => tracing::info!("received SIGTERM"),
            _ = int.recv() => tracing::info!("received SIGINT"),
            _ = hup.recv() => tracing::info!("received SIGHUP"),
        }
        coordinator.initiate_shutdown();
    });
}

#[cfg(windows)]
pub fn install(coordinator: ShutdownCoordinator) {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl-C");
        coordinator.initiate_shutdown();
    });
}
