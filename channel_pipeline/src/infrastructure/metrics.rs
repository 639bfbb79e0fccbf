// /////////////////////////////////////////////////////////////////////////////
// Channel Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service
//!
//! Prometheus metrics for the worker runtime (§5): Governor occupancy by
//! concurrency class, scheduler claim counts, board request/poll counters,
//! and per-stage attempt outcomes. Exposed via a small `/metrics` +
//! `/health` HTTP endpoint, deliberately hand-rolled against a raw
//! `TcpListener` rather than pulling in a web framework for two routes.

use std::sync::Arc;

use channel_pipeline_domain::PipelineError;
use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Prometheus metrics for the worker process.
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    governor_active_tasks: IntGaugeVec,
    scheduler_claims_total: IntCounterVec,
    board_outbound_requests_total: IntCounterVec,
    board_inbound_poll_duration_seconds: Histogram,
    stage_attempts_total: IntCounterVec,
    active_tasks_total: IntGauge,
}

impl MetricsService {
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let governor_active_tasks = IntGaugeVec::new(
            Opts::new("governor_active_tasks", "Tasks currently holding a governor permit, by concurrency class")
                .namespace("channel_pipeline"),
            &["class"],
        )
        .map_err(metrics_err("governor_active_tasks"))?;

        let scheduler_claims_total = IntCounterVec::new(
            Opts::new("scheduler_claims_total", "Claims attempted by the fair scheduler, by outcome")
                .namespace("channel_pipeline"),
            &["outcome"],
        )
        .map_err(metrics_err("scheduler_claims_total"))?;

        let board_outbound_requests_total = IntCounterVec::new(
            Opts::new("board_outbound_requests_total", "Outbound board API requests, by outcome")
                .namespace("channel_pipeline"),
            &["outcome"],
        )
        .map_err(metrics_err("board_outbound_requests_total"))?;

        let board_inbound_poll_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("board_inbound_poll_duration_seconds", "Duration of an inbound board poll cycle")
                .namespace("channel_pipeline")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .map_err(metrics_err("board_inbound_poll_duration_seconds"))?;

        let stage_attempts_total = IntCounterVec::new(
            Opts::new("stage_attempts_total", "Stage driver invocations, by stage and outcome")
                .namespace("channel_pipeline"),
            &["stage", "outcome"],
        )
        .map_err(metrics_err("stage_attempts_total"))?;

        let active_tasks_total = IntGauge::with_opts(
            Opts::new("active_tasks_total", "Tasks currently claimed by this worker").namespace("channel_pipeline"),
        )
        .map_err(metrics_err("active_tasks_total"))?;

        registry
            .register(Box::new(governor_active_tasks.clone()))
            .map_err(metrics_err("governor_active_tasks (register)"))?;
        registry
            .register(Box::new(scheduler_claims_total.clone()))
            .map_err(metrics_err("scheduler_claims_total (register)"))?;
        registry
            .register(Box::new(board_outbound_requests_total.clone()))
            .map_err(metrics_err("board_outbound_requests_total (register)"))?;
        registry
            .register(Box::new(board_inbound_poll_duration_seconds.clone()))
            .map_err(metrics_err("board_inbound_poll_duration_seconds (register)"))?;
        registry
            .register(Box::new(stage_attempts_total.clone()))
            .map_err(metrics_err("stage_attempts_total (register)"))?;
        registry
            .register(Box::new(active_tasks_total.clone()))
            .map_err(metrics_err("active_tasks_total (register)"))?;

        debug!("metrics service initialized with prometheus registry");

        Ok(Self {
            registry: Arc::new(registry),
            governor_active_tasks,
            scheduler_claims_total,
            board_outbound_requests_total,
            board_inbound_poll_duration_seconds,
            stage_attempts_total,
            active_tasks_total,
        })
    }

    pub fn set_governor_active(&self, class: &str, count: i64) {
        self.governor_active_tasks.with_label_values(&[class]).set(count);
    }

    pub fn record_scheduler_claim(&self, outcome: &str) {
        self.scheduler_claims_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_board_request(&self, outcome: &str) {
        self.board_outbound_requests_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_inbound_poll_duration(&self, secs: f64) {
        self.board_inbound_poll_duration_seconds.observe(secs);
    }

    pub fn record_stage_attempt(&self, stage: &str, outcome: &str) {
        self.stage_attempts_total.with_label_values(&[stage, outcome]).inc();
    }

    pub fn set_active_tasks(&self, count: i64) {
        self.active_tasks_total.set(count);
    }

    pub fn render(&self) -> Result<String, PipelineError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode_to_string(&families)
            .map_err(|e| PipelineError::internal_error(format!("failed to encode metrics: {e}")))
    }
}

fn metrics_err(metric: &'static str) -> impl Fn(prometheus::Error) -> PipelineError {
    move |e| PipelineError::internal_error(format!("failed to create/register {metric}: {e}"))
}

/// Serves `/metrics` and `/health` on `127.0.0.1:<port>` until the process
/// exits. Each connection is handled on its own task; a single slow or
/// broken client cannot block others.
pub struct MetricsEndpoint {
    metrics: Arc<MetricsService>,
    port: u16,
}

impl MetricsEndpoint {
    pub fn new(metrics: Arc<MetricsService>, port: u16) -> Self {
        Self { metrics, port }
    }

    pub async fn serve(&self) -> Result<(), PipelineError> {
        let addr = format!("127.0.0.1:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| PipelineError::internal_error(format!("failed to bind metrics endpoint on {addr}: {e}")))?;

        info!(%addr, "metrics endpoint listening");

        loop {
            match listener.accept().await {
                Ok((mut stream, _)) => {
                    let metrics = self.metrics.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_request(&mut stream, &metrics).await {
                            error!(error = %e, "error handling metrics request");
                        }
                    });
                }
                Err(e) => error!(error = %e, "error accepting metrics connection"),
            }
        }
    }
}

async fn handle_request(
    stream: &mut tokio::net::TcpStream,
    metrics: &MetricsService,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = [0u8; 1024];
    let n = stream.read(&mut buffer).await?;
    let request = String::from_utf8_lossy(&buffer[..n]);

    if request.starts_with("GET /metrics") {
        match metrics.render() {
            Ok(body) => {
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
            }
            Err(e) => {
                let body = format!("error generating metrics: {e}");
                let response = format!(
                    "HTTP/1.1 500 Internal Server Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await?;
            }
        }
    } else if request.starts_with("GET /health") {
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK")
            .await?;
    } else {
        stream
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: 9\r\n\r\nNot Found")
            .await?;
    }

    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_creation_succeeds() {
        let service = MetricsService::new().unwrap();
        assert!(service.render().is_ok());
    }

    #[test]
    fn governor_gauge_reports_set_value() {
        let service = MetricsService::new().unwrap();
        service.set_governor_active("video", 3);
        let rendered = service.render().unwrap();
        assert!(rendered.contains("channel_pipeline_governor_active_tasks"));
        assert!(rendered.contains("video"));
    }

    #[test]
    fn stage_attempt_counter_increments() {
        let service = MetricsService::new().unwrap();
        service.record_stage_attempt("video", "success");
        service.record_stage_attempt("video", "success");
        let rendered = service.render().unwrap();
        assert!(rendered.contains("channel_pipeline_stage_attempts_total"));
    }
}
