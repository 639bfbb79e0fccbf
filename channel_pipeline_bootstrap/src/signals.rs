// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! SIGTERM and SIGINT both trigger graceful shutdown through
//! [`crate::shutdown::ShutdownCoordinator`]; SIGHUP triggers a
//! reconfiguration reload rather than shutdown (§4.9: governor caps and
//! sync interval reload without restart).

use std::sync::Arc;

use crate::shutdown::ShutdownCoordinator;

/// Spawns a task that waits on SIGTERM/SIGINT and initiates shutdown.
/// Returns immediately; the returned `JoinHandle` is not normally awaited,
/// since the coordinator itself is what callers wait on.
#[cfg(unix)]
pub fn install_shutdown_signals(coordinator: Arc<ShutdownCoordinator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        tokio::select! {
            _ = term.recv() => tracing::info!("received SIGTERM, shutting down"),
            _ = int.recv() => tracing::info!("received SIGINT, shutting down"),
        }
        coordinator.initiate_shutdown();
    })
}

#[cfg(windows)]
pub fn install_shutdown_signals(coordinator: Arc<ShutdownCoordinator>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received Ctrl+C, shutting down");
        coordinator.initiate_shutdown();
    })
}

/// Spawns a task that waits on SIGHUP and invokes `on_reload` each time.
/// Runs until the process exits; SIGHUP may fire any number of times.
#[cfg(unix)]
pub fn install_reload_signal<F>(mut on_reload: F) -> tokio::task::JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        loop {
            hup.recv().await;
            tracing::info!("received SIGHUP, reloading configuration");
            on_reload();
        }
    })
}

#[cfg(windows)]
pub fn install_reload_signal<F>(_on_reload: F) -> tokio::task::JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        std::future::pending::<()>().await;
    })
}
