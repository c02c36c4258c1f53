// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service Implementation
//!
//! Prometheus-based metrics collection for the scheduling loop: stages
//! started/completed/failed, stage duration, cache hits, and artifact
//! backend round-trip counts. Thread-safe, cloned freely into stage
//! behaviors and backend implementations.

use pipeline_domain::error::PipelineError;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    stages_started_total: IntCounter,
    stages_completed_total: IntCounter,
    stages_failed_total: IntCounterVec,
    stage_duration_seconds: Histogram,
    cache_hits_total: IntCounter,
    cache_misses_total: IntCounter,
    active_stage_runs: IntGauge,
    backend_errors_total: IntCounterVec,
}

impl MetricsService {
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let stages_started_total = IntCounter::with_opts(
            Opts::new("stages_started_total", "Total stage executions started").namespace("pipeline"),
        )
        .map_err(metrics_error("stages_started_total"))?;

        let stages_completed_total = IntCounter::with_opts(
            Opts::new("stages_completed_total", "Total stage executions completed").namespace("pipeline"),
        )
        .map_err(metrics_error("stages_completed_total"))?;

        let stages_failed_total = IntCounterVec::new(
            Opts::new("stages_failed_total", "Total stage executions that failed").namespace("pipeline"),
            &["category"],
        )
        .map_err(metrics_error("stages_failed_total"))?;

        let stage_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("stage_duration_seconds", "Wall-clock time per stage execution")
                .namespace("pipeline")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        )
        .map_err(metrics_error("stage_duration_seconds"))?;

        let cache_hits_total = IntCounter::with_opts(
            Opts::new("cache_hits_total", "Artifacts served from the backend cache").namespace("pipeline"),
        )
        .map_err(metrics_error("cache_hits_total"))?;

        let cache_misses_total = IntCounter::with_opts(
            Opts::new("cache_misses_total", "Artifacts that required fresh execution").namespace("pipeline"),
        )
        .map_err(metrics_error("cache_misses_total"))?;

        let active_stage_runs = IntGauge::with_opts(
            Opts::new("active_stage_runs", "Stage executions currently in flight").namespace("pipeline"),
        )
        .map_err(metrics_error("active_stage_runs"))?;

        let backend_errors_total = IntCounterVec::new(
            Opts::new("backend_errors_total", "Artifact backend operation failures").namespace("pipeline"),
            &["operation"],
        )
        .map_err(metrics_error("backend_errors_total"))?;

        registry
            .register(Box::new(stages_started_total.clone()))
            .map_err(metrics_error("register stages_started_total"))?;
        registry
            .register(Box::new(stages_completed_total.clone()))
            .map_err(metrics_error("register stages_completed_total"))?;
        registry
            .register(Box::new(stages_failed_total.clone()))
            .map_err(metrics_error("register stages_failed_total"))?;
        registry
            .register(Box::new(stage_duration_seconds.clone()))
            .map_err(metrics_error("register stage_duration_seconds"))?;
        registry
            .register(Box::new(cache_hits_total.clone()))
            .map_err(metrics_error("register cache_hits_total"))?;
        registry
            .register(Box::new(cache_misses_total.clone()))
            .map_err(metrics_error("register cache_misses_total"))?;
        registry
            .register(Box::new(active_stage_runs.clone()))
            .map_err(metrics_error("register active_stage_runs"))?;
        registry
            .register(Box::new(backend_errors_total.clone()))
            .map_err(metrics_error("register backend_errors_total"))?;

        debug!("metrics service initialized");

        Ok(Self {
            registry: Arc::new(registry),
            stages_started_total,
            stages_completed_total,
            stages_failed_total,
            stage_duration_seconds,
            cache_hits_total,
            cache_misses_total,
            active_stage_runs,
            backend_errors_total,
        })
    }

    pub fn stage_started(&self) {
        self.stages_started_total.inc();
        self.active_stage_runs.inc();
    }

    pub fn stage_completed(&self, duration: Duration) {
        self.stages_completed_total.inc();
        self.stage_duration_seconds.observe(duration.as_secs_f64());
        self.active_stage_runs.dec();
    }

    pub fn stage_failed(&self, category: &str) {
        self.stages_failed_total.with_label_values(&[category]).inc();
        self.active_stage_runs.dec();
    }

    pub fn cache_hit(&self) {
        self.cache_hits_total.inc();
    }

    pub fn cache_miss(&self) {
        self.cache_misses_total.inc();
    }

    pub fn backend_error(&self, operation: &str) {
        self.backend_errors_total.with_label_values(&[operation]).inc();
    }

    /// Prometheus exposition-format text for a scrape endpoint.
    pub fn render(&self) -> Result<String, PipelineError> {
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode_to_string(&families)
            .map_err(|e| PipelineError::Internal(format!("failed to encode metrics: {e}")))
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new().expect("default metric registration is infallible")
    }
}

fn metrics_error(what: &'static str) -> impl Fn(prometheus::Error) -> PipelineError {
    move |e| PipelineError::Internal(format!("failed to set up metric '{what}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_stage_lifecycle() {
        let service = MetricsService::new().unwrap();
        service.stage_started();
        service.stage_completed(Duration::from_millis(10));
        service.cache_hit();
        let rendered = service.render().unwrap();
        assert!(rendered.contains("pipeline_stages_started_total"));
        assert!(rendered.contains("pipeline_cache_hits_total"));
    }

    #[test]
    fn records_failures_by_category() {
        let service = MetricsService::new().unwrap();
        service.stage_started();
        service.stage_failed("worker_failure");
        let rendered = service.render().unwrap();
        assert!(rendered.contains("pipeline_stages_failed_total"));
        assert!(rendered.contains("worker_failure"));
    }
}
