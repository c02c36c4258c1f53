// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local Executor
//!
//! Runs a stage's behavior in the submitting process and reports its
//! lifecycle to an optional [`MetricsService`]. This is the only executor
//! a single-process pipeline run needs; [`super::remote::RemoteQueueExecutor`]
//! wraps one of these for the stages it must still run locally.

use crate::infrastructure::metrics::MetricsService;
use async_trait::async_trait;
use pipeline_domain::entities::{Artifact, StageConfig};
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::{Executor, StageBehavior};
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

#[derive(Clone, Default)]
pub struct LocalExecutor {
    metrics: Option<MetricsService>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: MetricsService) -> Self {
        Self { metrics: Some(metrics) }
    }
}

#[async_trait]
impl Executor for LocalExecutor {
    #[instrument(skip(self, stage, inputs), fields(stage = %config.name, inputs = inputs.len()))]
    async fn run_stage(
        &self,
        stage: Arc<dyn StageBehavior>,
        config: &StageConfig,
        inputs: Vec<Artifact>,
        pipeline_run_id: &str,
    ) -> Result<Vec<Artifact>, PipelineError> {
        tracing::debug!(pipeline_run_id, "running stage locally");
        if let Some(metrics) = &self.metrics {
            metrics.stage_started();
        }
        let started = Instant::now();
        let result = stage.yield_artifacts(config, &inputs).await;
        match (&result, &self.metrics) {
            (Ok(artifacts), Some(metrics)) => {
                metrics.stage_completed(started.elapsed());
                tracing::debug!(produced = artifacts.len(), "stage completed");
            }
            (Err(err), Some(metrics)) => metrics.stage_failed(err.category()),
            _ => {}
        }
        result
    }
}
