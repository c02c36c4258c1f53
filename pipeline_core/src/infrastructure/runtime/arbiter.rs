// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Arbiter
//!
//! Owns the top-level scheduling loop for one pipeline run: an endpoint
//! driver task per endpoint, a queue listener that drives `generate_stage`
//! for every stage an in-flight [`PendingInputFuture`] names, and an
//! optional `close_after` timeout. `Running` transitions to `Shutdown` on
//! `SIGHUP`/`SIGINT`/`SIGTERM`, on `close_after` expiry, or once every
//! endpoint has produced its final artifacts.

use super::input_future::PendingInputFuture;
use super::resolver::{generate_stage, ResolverContext};
use pipeline_bootstrap::shutdown::ShutdownCoordinator;
use pipeline_domain::aggregates::Pipeline;
use pipeline_domain::entities::Artifact;
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::{ArtifactBackend, Executor};
use pipeline_domain::services::stage_registry::StageRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Final artifacts produced by one pipeline run, grouped by endpoint in
/// the pipeline's declared order.
pub struct RunOutcome {
    pub final_artifacts: Vec<Artifact>,
}

pub struct Arbiter {
    pipeline: Arc<Pipeline>,
    registry: Arc<StageRegistry>,
    executor: Arc<dyn Executor>,
    backend: Arc<dyn ArtifactBackend>,
    metrics: Option<crate::infrastructure::metrics::MetricsService>,
    shutdown: ShutdownCoordinator,
    pipeline_run_id: String,
}

impl Arbiter {
    pub fn new(
        pipeline: Pipeline,
        registry: StageRegistry,
        executor: Arc<dyn Executor>,
        backend: Arc<dyn ArtifactBackend>,
        pipeline_run_id: impl Into<String>,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            registry: Arc::new(registry),
            executor,
            backend,
            metrics: None,
            shutdown: ShutdownCoordinator::default(),
            pipeline_run_id: pipeline_run_id.into(),
        }
    }

    pub fn with_metrics(mut self, metrics: crate::infrastructure::metrics::MetricsService) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_coordinator(&self) -> ShutdownCoordinator {
        self.shutdown.clone()
    }

    /// Drives the pipeline to completion: evaluates every endpoint,
    /// accumulating their produced artifacts. Returns as soon as all
    /// endpoints resolve, or surfaces the first fatal error encountered
    /// (which also triggers shutdown of the queue listener).
    pub async fn run(&self, close_after: Option<u64>) -> Result<RunOutcome, PipelineError> {
        let (schedule_tx, schedule_rx) = mpsc::unbounded_channel();
        let ctx = ResolverContext {
            pipeline: self.pipeline.clone(),
            registry: self.registry.clone(),
            executor: self.executor.clone(),
            backend: self.backend.clone(),
            metrics: self.metrics.clone(),
            schedule: schedule_tx,
            pipeline_run_id: self.pipeline_run_id.clone(),
        };

        let mut listener = tokio::spawn(queue_listener(ctx.clone(), schedule_rx, self.shutdown.token()));

        if let Some(seconds) = close_after {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                shutdown.initiate_shutdown();
            });
        }

        let mut final_artifacts = Vec::new();
        for endpoint in self.pipeline.endpoints().iter().cloned() {
            if self.shutdown.is_shutting_down() {
                break;
            }
            let shutdown_token = self.shutdown.token();
            let handles = tokio::select! {
                result = generate_stage(&ctx, &endpoint) => result?,
                _ = shutdown_token.cancelled() => break,
            };
            for handle in handles {
                match handle.await {
                    Ok(Ok(artifacts)) => final_artifacts.extend(artifacts),
                    Ok(Err(err)) => {
                        self.shutdown.initiate_shutdown();
                        return Err(err);
                    }
                    Err(_) => {
                        self.shutdown.initiate_shutdown();
                        return Err(PipelineError::Cancelled);
                    }
                }
            }
        }

        self.shutdown.initiate_shutdown();
        tokio::select! {
            _ = &mut listener => {}
            _ = self.shutdown.wait_for_shutdown() => {
                listener.abort();
            }
        }
        self.shutdown.complete_shutdown();
        Ok(RunOutcome { final_artifacts })
    }
}

/// Consumes [`PendingInputFuture`]s and, for each, drives `generate_stage`
/// on every declared input source concurrently, joining their awaitables
/// before resolving the future. Never awaits `generate_stage` inline on
/// this task's own stack: a recursive request for a deeper stage goes back
/// through `ctx.schedule` to this same loop, so the resolution must be
/// spawned rather than awaited here, or the loop would deadlock on itself.
async fn queue_listener(
    ctx: ResolverContext,
    mut queue: mpsc::UnboundedReceiver<PendingInputFuture>,
    cancel: pipeline_bootstrap::shutdown::CancellationToken,
) {
    loop {
        let pending = tokio::select! {
            pending = queue.recv() => match pending {
                Some(pending) => pending,
                None => return,
            },
            _ = cancel.cancelled() => return,
        };
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let outcome = resolve_sources(&ctx, pending.input_sources.clone()).await;
            pending.resolve(outcome);
        });
    }
}

async fn resolve_sources(
    ctx: &ResolverContext,
    sources: Vec<pipeline_domain::value_objects::StageName>,
) -> Result<Vec<Vec<Artifact>>, PipelineError> {
    let mut per_source = Vec::with_capacity(sources.len());
    for source in &sources {
        let handles = generate_stage(ctx, source).await?;
        let mut artifacts = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(result) => artifacts.extend(result?),
                Err(_) => return Err(PipelineError::Cancelled),
            }
        }
        per_source.push(artifacts);
    }
    Ok(per_source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backend::LocalArtifactBackend;
    use crate::infrastructure::executor::LocalExecutor;
    use pipeline_domain::entities::{StageConfig, StageKind};
    use pipeline_domain::repositories::ExecutorCallableRegistry;
    use pipeline_domain::value_objects::StageName;
    use std::collections::BTreeMap;

    fn name(s: &str) -> StageName {
        StageName::new(s).unwrap()
    }

    #[tokio::test]
    async fn linear_pipeline_caches_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let configs = vec![
            StageConfig::new(
                name("A"),
                StageKind::Parameter {
                    params: BTreeMap::from([("k".to_string(), serde_json::json!("v"))]),
                },
                vec![],
            ),
            StageConfig::new(name("B"), StageKind::Identity, vec![name("A")]),
        ];

        let backend: Arc<dyn ArtifactBackend> = Arc::new(LocalArtifactBackend::new(dir.path()).unwrap());
        let arbiter = Arbiter::new(
            Pipeline::new(configs.clone()).unwrap(),
            StageRegistry::new(ExecutorCallableRegistry::new()),
            Arc::new(LocalExecutor::new()),
            backend.clone(),
            "run-1",
        );
        let first = arbiter.run(None).await.unwrap();
        assert_eq!(first.final_artifacts.len(), 1);
        assert!(!first.final_artifacts[0].loaded_from_cache);

        let arbiter = Arbiter::new(
            Pipeline::new(configs).unwrap(),
            StageRegistry::new(ExecutorCallableRegistry::new()),
            Arc::new(LocalExecutor::new()),
            backend,
            "run-2",
        );
        let second = arbiter.run(None).await.unwrap();
        assert_eq!(second.final_artifacts.len(), 1);
        assert!(second.final_artifacts[0].loaded_from_cache);
    }

    #[tokio::test]
    async fn grid_search_fans_out_into_distinct_groups() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = BTreeMap::new();
        params.insert("lr".to_string(), vec![serde_json::json!(0.1), serde_json::json!(0.2)]);
        let configs = vec![StageConfig::new(name("G"), StageKind::GridSearch { params }, vec![])];
        let backend: Arc<dyn ArtifactBackend> = Arc::new(LocalArtifactBackend::new(dir.path()).unwrap());
        let arbiter = Arbiter::new(
            Pipeline::new(configs).unwrap(),
            StageRegistry::new(ExecutorCallableRegistry::new()),
            Arc::new(LocalExecutor::new()),
            backend,
            "run-1",
        );
        let outcome = arbiter.run(None).await.unwrap();
        assert_eq!(outcome.final_artifacts.len(), 2);
    }
}
