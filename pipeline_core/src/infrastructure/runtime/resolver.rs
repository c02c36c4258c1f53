// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Resolver
//!
//! Turns a stage name into zero or more running tasks, one per fan-out
//! group, recursively resolving direct predecessors through the Arbiter's
//! scheduling channel rather than calling itself in the same stack frame.
//! A stage with inputs always goes back out through `schedule` and is
//! driven forward by the Arbiter's queue listener, so two concurrently
//! resolving stages never deadlock on each other's call stack.

use super::input_future::PendingInputFuture;
use pipeline_domain::aggregates::Pipeline;
use pipeline_domain::entities::{Artifact, StageConfig};
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::{ArtifactBackend, Executor};
use pipeline_domain::services::hashing::dependency_hash;
use pipeline_domain::services::stage_registry::StageRegistry;
use pipeline_domain::value_objects::StageName;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Shared, cloneable context threaded through every resolver call for one
/// pipeline run.
#[derive(Clone)]
pub struct ResolverContext {
    pub pipeline: Arc<Pipeline>,
    pub registry: Arc<StageRegistry>,
    pub executor: Arc<dyn Executor>,
    pub backend: Arc<dyn ArtifactBackend>,
    pub metrics: Option<crate::infrastructure::metrics::MetricsService>,
    pub schedule: UnboundedSender<PendingInputFuture>,
    pub pipeline_run_id: String,
}

/// One fan-out group's worth of work, already spawned onto the runtime.
pub type StageAwaitable = JoinHandle<Result<Vec<Artifact>, PipelineError>>;

/// Resolves `name` to one awaitable per fan-out group. A stage with no
/// inputs yields exactly one group (the empty input set); a stage with
/// inputs blocks on an [`PendingInputFuture`] naming its direct
/// predecessors before fan-out grouping runs.
pub async fn generate_stage(ctx: &ResolverContext, name: &StageName) -> Result<Vec<StageAwaitable>, PipelineError> {
    let config = ctx
        .pipeline
        .stage(name)
        .ok_or_else(|| PipelineError::config_error(format!("unknown stage '{name}'")))?
        .clone();

    if !config.has_inputs() {
        let handle = spawn_run_stage(ctx.clone(), config, Vec::new());
        return Ok(vec![handle]);
    }

    let (pending, input_future) = PendingInputFuture::new(name.clone(), config.inputs.clone());
    ctx.schedule
        .send(pending)
        .map_err(|_| PipelineError::Internal("arbiter queue listener is gone".into()))?;
    let inputs = input_future.await_artifacts().await?;

    let groups = Pipeline::group_by_fanout(&inputs);
    Ok(groups.into_iter().map(|group| spawn_run_stage(ctx.clone(), config.clone(), group)).collect())
}

fn spawn_run_stage(ctx: ResolverContext, config: StageConfig, inputs: Vec<Artifact>) -> StageAwaitable {
    tokio::spawn(async move { run_stage(&ctx, &config, inputs).await })
}

/// Runs one fan-out group through the cache-or-execute path: a completed or
/// in-progress stage run is served from the Backend; otherwise the group is
/// handed to the Executor and the result persisted before being returned.
async fn run_stage(ctx: &ResolverContext, config: &StageConfig, inputs: Vec<Artifact>) -> Result<Vec<Artifact>, PipelineError> {
    use pipeline_domain::entities::StageRunStatus;

    let dep_hash = dependency_hash(&inputs);
    match ctx.backend.pipeline_stage_run_status(config, &dep_hash).await? {
        StageRunStatus::Complete | StageRunStatus::InProgress => {
            let mut cached = ctx.backend.find_pipeline_stage_run_artifacts(config, &dep_hash).await?;
            for artifact in &mut cached {
                artifact.loaded_from_cache = true;
            }
            return Ok(cached);
        }
        StageRunStatus::DoesNotExist => {}
    }

    let behavior = ctx.registry.behavior_for(&config.kind);
    let mut artifacts = ctx.executor.run_stage(behavior, config, inputs, &ctx.pipeline_run_id).await?;

    let creation_time = now_unix_seconds();
    for artifact in &mut artifacts {
        if artifact.remotely_produced {
            continue;
        }
        artifact.ensure_run_metadata(creation_time, &dep_hash);
        ctx.backend.save_artifact(artifact).await?;
    }
    ctx.backend.log_pipeline_stage_run_complete(config, &dep_hash).await?;
    Ok(artifacts)
}

fn now_unix_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backend::LocalArtifactBackend;
    use crate::infrastructure::executor::LocalExecutor;
    use pipeline_domain::entities::StageKind;
    use pipeline_domain::repositories::ExecutorCallableRegistry;
    use std::collections::BTreeMap;
    use tokio::sync::mpsc;

    fn ctx(backend: Arc<dyn ArtifactBackend>) -> (ResolverContext, mpsc::UnboundedReceiver<PendingInputFuture>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::new(vec![
            StageConfig::new(
                StageName::new("A").unwrap(),
                StageKind::Parameter {
                    params: BTreeMap::from([("k".to_string(), serde_json::json!("v"))]),
                },
                vec![],
            ),
            StageConfig::new(StageName::new("B").unwrap(), StageKind::Identity, vec![StageName::new("A").unwrap()]),
        ])
        .unwrap();
        let ctx = ResolverContext {
            pipeline: Arc::new(pipeline),
            registry: Arc::new(StageRegistry::new(ExecutorCallableRegistry::new())),
            executor: Arc::new(LocalExecutor::new()),
            backend,
            metrics: None,
            schedule: tx,
            pipeline_run_id: "run-1".into(),
        };
        (ctx, rx)
    }

    #[tokio::test]
    async fn leaf_stage_resolves_without_touching_the_schedule_channel() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn ArtifactBackend> = Arc::new(LocalArtifactBackend::new(dir.path()).unwrap());
        let (ctx, _rx) = ctx(backend);
        let handles = generate_stage(&ctx, &StageName::new("A").unwrap()).await.unwrap();
        assert_eq!(handles.len(), 1);
        let artifacts = handles.into_iter().next().unwrap().await.unwrap().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert!(!artifacts[0].loaded_from_cache);
    }

    #[tokio::test]
    async fn repeated_run_serves_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn ArtifactBackend> = Arc::new(LocalArtifactBackend::new(dir.path()).unwrap());
        let (ctx, _rx) = ctx(backend);
        let config = ctx.pipeline.stage(&StageName::new("A").unwrap()).unwrap().clone();

        let first = run_stage(&ctx, &config, Vec::new()).await.unwrap();
        assert!(!first[0].loaded_from_cache);

        let second = run_stage(&ctx, &config, Vec::new()).await.unwrap();
        assert!(second[0].loaded_from_cache);
    }

    #[tokio::test]
    async fn stage_with_inputs_publishes_a_pending_input_future() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn ArtifactBackend> = Arc::new(LocalArtifactBackend::new(dir.path()).unwrap());
        let (ctx, mut rx) = ctx(backend);
        let join = tokio::spawn({
            let ctx = ctx.clone();
            async move { generate_stage(&ctx, &StageName::new("B").unwrap()).await }
        });

        let pending = rx.recv().await.unwrap();
        assert_eq!(pending.input_sources, vec![StageName::new("A").unwrap()]);
        pending.resolve(Ok(vec![]));

        let handles = join.await.unwrap().unwrap();
        assert_eq!(handles.len(), 1);
    }
}
