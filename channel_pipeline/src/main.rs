// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Channel Pipeline Worker
//!
//! Process entry point: parses CLI arguments, loads layered configuration,
//! opens the SQLite Task Store, and wires up every long-lived loop the
//! worker runs (Fair Scheduler claim loop, inbound/outbound board sync,
//! heartbeat, stale-claim reclaim, metrics endpoint) under one
//! [`ShutdownCoordinator`](channel_pipeline_bootstrap::shutdown::ShutdownCoordinator).

use std::sync::Arc;

use channel_pipeline::application::{LocalAssetPublisher, Orchestrator, WorkerLoop};
use channel_pipeline::infrastructure::board::{BoardClient, BoardSynchronizer, RateLimiter};
use channel_pipeline::infrastructure::config::{BoardSyncConfig, GovernorConfig, WorkerConfig};
use channel_pipeline::infrastructure::filesystem::WorkspaceLayout;
use channel_pipeline::infrastructure::governor::Governor;
use channel_pipeline::infrastructure::heartbeat::{reclaim_stale_claims, HeartbeatWriter};
use channel_pipeline::infrastructure::logging::init_tracing;
use channel_pipeline::infrastructure::metrics::{MetricsEndpoint, MetricsService};
use channel_pipeline::infrastructure::persistence::{initialize_database, SqliteChannelRepository, SqliteTaskRepository};
use channel_pipeline::infrastructure::runtime::{join_supervised, spawn_supervised};
use channel_pipeline_bootstrap::shutdown::ShutdownCoordinator;
use channel_pipeline_bootstrap::{bootstrap_cli, result_to_exit_code};
use channel_pipeline_domain::PipelineError;
use tokio::sync::{watch, RwLock};
use tracing::{error, info};
use uuid::Uuid;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = match bootstrap_cli() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("CLI error: {e}");
            return channel_pipeline_bootstrap::ExitCode::ConfigError.into();
        }
    };

    init_tracing(cli.verbose);

    let result = run_worker(cli).await;
    result_to_exit_code(result)
}

async fn run_worker(cli: channel_pipeline_bootstrap::ValidatedCli) -> Result<(), PipelineError> {
    let worker_id = format!("worker-{}", Uuid::new_v4());
    info!(worker_id, "starting channel pipeline worker");

    let config = WorkerConfig::load(cli.config.as_deref())?;
    let pool = initialize_database(&config.database_url).await?;

    let task_repo: Arc<dyn channel_pipeline::TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let channel_repo: Arc<dyn channel_pipeline::ChannelRepository> = Arc::new(SqliteChannelRepository::new(pool.clone()));

    let (governor_tx, governor_rx) = watch::channel(config.governor);
    let mut governor_reload_rx = governor_rx.clone();
    let governor = Arc::new(RwLock::new(Governor::new(governor_rx)));

    let (board_sync_tx, board_sync_rx) = watch::channel(config.board_sync.clone());

    let metrics = Arc::new(MetricsService::new()?);

    let board_client = Arc::new(BoardClient::new(
        config.board_api_base_url.clone(),
        config.board_api_token.clone(),
        RateLimiter::board_default(),
    ));
    let (synchronizer, outbound, outbound_rx) = BoardSynchronizer::new(board_client, task_repo.clone(), channel_repo.clone(), metrics.clone());
    let synchronizer = Arc::new(synchronizer);

    let layout = WorkspaceLayout::new(config.workspace_root.clone());
    let asset_publisher: Arc<dyn channel_pipeline::AssetPublisher> = Arc::new(LocalAssetPublisher::new(
        config.workspace_root.clone(),
        config.public_asset_base_url.clone().unwrap_or_else(|| "http://localhost:8080/assets".to_string()),
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        task_repo.clone(),
        channel_repo.clone(),
        governor.clone(),
        outbound,
        metrics.clone(),
        layout,
        config.generators.clone(),
        asset_publisher,
    ));

    let worker_loop = Arc::new(WorkerLoop::new(task_repo.clone(), channel_repo.clone(), governor.clone(), orchestrator, metrics.clone()));

    let coordinator = Arc::new(ShutdownCoordinator::default());
    channel_pipeline_bootstrap::signals::install_shutdown_signals(coordinator.clone());

    {
        let governor_tx = governor_tx.clone();
        let board_sync_tx = board_sync_tx.clone();
        let config_path = cli.config.clone();
        channel_pipeline_bootstrap::signals::install_reload_signal(move || match WorkerConfig::load(config_path.as_deref()) {
            Ok(fresh) => {
                info!("reloading governor and board sync configuration");
                governor_tx.send_if_modified(|current: &mut GovernorConfig| {
                    if *current == fresh.governor {
                        false
                    } else {
                        *current = fresh.governor;
                        true
                    }
                });
                board_sync_tx.send_if_modified(|current: &mut BoardSyncConfig| {
                    if *current == fresh.board_sync {
                        false
                    } else {
                        *current = fresh.board_sync.clone();
                        true
                    }
                });
            }
            Err(e) => error!(error = %e, "failed to reload configuration on SIGHUP"),
        });
    }

    let shutdown = coordinator.token();

    let metrics_handle = spawn_supervised("metrics-endpoint", {
        let metrics = metrics.clone();
        let port = cli.metrics_port;
        async move { MetricsEndpoint::new(metrics, port).serve().await }
    });

    let governor_reload_handle = spawn_supervised("governor-reload-watcher", {
        let governor = governor.clone();
        let shutdown = shutdown.clone();
        async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    changed = governor_reload_rx.changed() => {
                        if changed.is_err() {
                            return Ok(());
                        }
                        governor.write().await.reload();
                        info!("concurrency governor caps reloaded");
                    }
                }
            }
        }
    });

    let heartbeat_handle = spawn_supervised("heartbeat-writer", {
        let pool = pool.clone();
        let worker_id = worker_id.clone();
        let interval = config.heartbeat_interval;
        let shutdown = shutdown.clone();
        async move {
            HeartbeatWriter::new(pool, worker_id, interval).run(shutdown).await;
            Ok(())
        }
    });

    let reclaim_handle = spawn_supervised("stale-claim-reclaim", {
        let pool = pool.clone();
        let timeout = config.heartbeat_timeout;
        let shutdown = shutdown.clone();
        async move {
            loop {
                if let Err(e) = reclaim_stale_claims(&pool, timeout).await {
                    error!(error = %e, "stale claim reclaim pass failed");
                }
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(timeout / 2) => {}
                }
            }
        }
    });

    let outbound_handle = spawn_supervised("board-sync-outbound", {
        let synchronizer = synchronizer.clone();
        let shutdown = shutdown.clone();
        async move {
            synchronizer.run_outbound(outbound_rx, shutdown).await;
            Ok(())
        }
    });

    let inbound_handle = spawn_supervised("board-sync-inbound", {
        let synchronizer = synchronizer.clone();
        let shutdown = shutdown.clone();
        async move {
            synchronizer.run_inbound(board_sync_rx, shutdown).await;
            Ok(())
        }
    });

    let claim_loop_handle = spawn_supervised("worker-claim-loop", {
        let worker_loop = worker_loop.clone();
        let shutdown = shutdown.clone();
        async move { worker_loop.run(shutdown).await }
    });

    join_supervised(claim_loop_handle).await?;

    coordinator.initiate_shutdown();
    coordinator.wait_for_shutdown().await;
    coordinator.complete_shutdown();

    for handle in [governor_reload_handle, heartbeat_handle, reclaim_handle, outbound_handle, inbound_handle] {
        if let Err(e) = join_supervised(handle).await {
            error!(error = %e, "supervised loop exited with an error during shutdown");
        }
    }
    metrics_handle.abort();

    info!("channel pipeline worker shut down cleanly");
    Ok(())
}
