// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Prometheus metrics and their HTTP exposition endpoint (SPEC_FULL.md §B),
//! following the teacher's `infrastructure::metrics` module shape: a
//! registry of counters/gauges/histograms built once at startup, served by
//! a minimal hand-rolled `tokio::net::TcpListener` loop rather than a full
//! web framework — nothing here needs routing beyond a single `/metrics`
//! text-exposition response.

use std::sync::Arc;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use nes_execution_domain::PipelineError;

/// Every metric the engine exposes (SPEC_FULL.md §B): tasks processed,
/// queue depth per task queue, watermark lag per origin, window fires,
/// join output tuples, adaptive `nextTuplesPerTask`, buffer pool occupancy.
pub struct EngineMetrics {
    registry: Registry,
    pub tasks_processed: IntCounter,
    pub queue_depth: IntGauge,
    pub watermark_lag_ms: IntGauge,
    pub window_fires: IntCounter,
    pub join_output_tuples: IntCounter,
    pub next_tuples_per_task: IntGauge,
    pub buffer_pool_occupancy: IntGauge,
    pub task_latency_ms: Histogram,
}

impl EngineMetrics {
    pub fn new() -> Result<Arc<Self>, PipelineError> {
        let registry = Registry::new();

        let tasks_processed = IntCounter::with_opts(Opts::new("nes_tasks_processed_total", "Total pipeline tasks executed"))
            .map_err(metrics_error)?;
        let queue_depth = IntGauge::with_opts(Opts::new("nes_queue_depth", "Current depth of a task queue")).map_err(metrics_error)?;
        let watermark_lag_ms =
            IntGauge::with_opts(Opts::new("nes_watermark_lag_ms", "Lag between wall clock and watermark, per origin"))
                .map_err(metrics_error)?;
        let window_fires = IntCounter::with_opts(Opts::new("nes_window_fires_total", "Total window slices fired")).map_err(metrics_error)?;
        let join_output_tuples =
            IntCounter::with_opts(Opts::new("nes_join_output_tuples_total", "Total tuples emitted by stream joins")).map_err(metrics_error)?;
        let next_tuples_per_task =
            IntGauge::with_opts(Opts::new("nes_next_tuples_per_task", "Adaptive controller's current batch size target"))
                .map_err(metrics_error)?;
        let buffer_pool_occupancy =
            IntGauge::with_opts(Opts::new("nes_buffer_pool_occupancy", "Buffers currently checked out of the pool")).map_err(metrics_error)?;
        let task_latency_ms = Histogram::with_opts(HistogramOpts::new("nes_task_latency_ms", "Per-task execution latency"))
            .map_err(metrics_error)?;

        registry.register(Box::new(tasks_processed.clone())).map_err(metrics_error)?;
        registry.register(Box::new(queue_depth.clone())).map_err(metrics_error)?;
        registry.register(Box::new(watermark_lag_ms.clone())).map_err(metrics_error)?;
        registry.register(Box::new(window_fires.clone())).map_err(metrics_error)?;
        registry.register(Box::new(join_output_tuples.clone())).map_err(metrics_error)?;
        registry.register(Box::new(next_tuples_per_task.clone())).map_err(metrics_error)?;
        registry.register(Box::new(buffer_pool_occupancy.clone())).map_err(metrics_error)?;
        registry.register(Box::new(task_latency_ms.clone())).map_err(metrics_error)?;

        Ok(Arc::new(Self {
            registry,
            tasks_processed,
            queue_depth,
            watermark_lag_ms,
            window_fires,
            join_output_tuples,
            next_tuples_per_task,
            buffer_pool_occupancy,
            task_latency_ms,
        }))
    }

    fn render(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        // Infallible for an in-memory `Vec<u8>` writer; a malformed metric
        // family would be a programming error caught by the unit test
        // below, not a runtime condition callers need to handle.
        encoder.encode(&families, &mut buf).expect("prometheus text encoding never fails for a Vec<u8> sink");
        buf
    }
}

/// Serves `GET /metrics` on `addr` until the process exits. Spawned as a
/// background task from `main.rs`'s `Serve` command; never returns under
/// normal operation.
pub async fn serve(metrics: Arc<EngineMetrics>, addr: &str) -> Result<(), PipelineError> {
    let listener = TcpListener::bind(addr).await.map_err(|e| PipelineError::IoError(e.to_string()))?;
    debug!(%addr, "metrics endpoint listening");
    loop {
        let (mut socket, _) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "metrics endpoint failed to accept connection");
                continue;
            }
        };
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let mut request = [0u8; 1024];
            if socket.read(&mut request).await.is_err() {
                return;
            }
            let body = metrics.render();
            let header = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: text/plain; version=0.0.4\r\ncontent-length: {}\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(header.as_bytes()).await;
            let _ = socket.write_all(&body).await;
        });
    }
}

fn metrics_error(err: prometheus::Error) -> PipelineError {
    PipelineError::internal_error(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_every_registered_metric_as_prometheus_text() {
        let metrics = EngineMetrics::new().unwrap();
        metrics.tasks_processed.inc();
        metrics.queue_depth.set(3);

        let rendered = String::from_utf8(metrics.render()).unwrap();
        assert!(rendered.contains("nes_tasks_processed_total 1"));
        assert!(rendered.contains("nes_queue_depth 3"));
    }
}
