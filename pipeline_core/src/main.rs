// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # `pipeline-worker` binary
//!
//! Wires [`pipeline_bootstrap`]'s CLI, config, signal, and shutdown
//! surfaces to the scheduler core: `run` drives a pipeline to completion
//! in-process with an [`Arbiter`](pipeline_core::infrastructure::runtime::Arbiter);
//! `serve` starts a [`WorkerServer`](pipeline_core::infrastructure::worker::WorkerServer)
//! consuming the remote task queue. Neither subcommand can register
//! `Executor`-kind stage callables from the command line; embedding
//! applications that need them depend on this crate as a library instead
//! of running this binary.

use pipeline_bootstrap::shutdown::ShutdownCoordinator;
use pipeline_bootstrap::{map_error_to_exit_code, parse_cli, signals, ExitCode, ParsedCommand};
use pipeline_core::infrastructure::backend::LocalArtifactBackend;
use pipeline_core::infrastructure::config::{BackendKind, ExecutorKind, RuntimeConfig};
use pipeline_core::infrastructure::executor::{LocalExecutor, RemoteQueueExecutor};
use pipeline_core::infrastructure::logging;
use pipeline_core::infrastructure::metrics::MetricsService;
use pipeline_core::infrastructure::runtime::Arbiter;
use pipeline_core::infrastructure::worker::WorkerServer;
use pipeline_domain::aggregates::Pipeline;
use pipeline_domain::entities::StageConfig;
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::{ArtifactBackend, Executor};
use pipeline_domain::services::stage_registry::StageRegistry;
use pipeline_domain::repositories::ExecutorCallableRegistry;
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> ProcessExitCode {
    let (command, cli) = match parse_cli() {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::ConfigError.into();
        }
    };

    let config = match RuntimeConfig::load(cli.config.as_deref().and_then(|p| p.to_str())) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::ConfigError.into();
        }
    };

    let log_level = if cli.verbose { "debug" } else { config.observability.log_level.as_str() };
    logging::init(log_level);

    let shutdown = ShutdownCoordinator::default();
    signals::install(shutdown.clone());

    let result = match command {
        ParsedCommand::Run { pipeline, close_after } => run_pipeline(&config, &pipeline, close_after, shutdown).await,
        ParsedCommand::Serve { close_after } => serve(&config, close_after, shutdown).await,
    };

    match result {
        Ok(()) => ExitCode::Ok.into(),
        Err(err) => {
            tracing::error!(error = %err, "pipeline-worker exiting with error");
            map_error_to_exit_code(&err).into()
        }
    }
}

async fn run_pipeline(
    config: &RuntimeConfig,
    pipeline_path: &std::path::Path,
    close_after: Option<u64>,
    shutdown: ShutdownCoordinator,
) -> Result<(), PipelineError> {
    let body = std::fs::read_to_string(pipeline_path)
        .map_err(|e| PipelineError::config_error(format!("failed to read {}: {e}", pipeline_path.display())))?;
    let stages: Vec<StageConfig> =
        serde_json::from_str(&body).map_err(|e| PipelineError::config_error(format!("invalid pipeline config: {e}")))?;
    let pipeline = Pipeline::new(stages)?;

    let registry = StageRegistry::new(ExecutorCallableRegistry::new());
    let backend: Arc<dyn ArtifactBackend> = build_backend(config).await?;
    let executor: Arc<dyn Executor> = build_executor(config, backend.clone()).await?;

    let run_id = format!("run-{}", ulid::Ulid::new());
    let mut arbiter = Arbiter::new(pipeline, registry, executor, backend, run_id).with_shutdown(shutdown);
    if config.observability.metrics_enabled {
        arbiter = arbiter.with_metrics(MetricsService::new()?);
    }

    let close_after = close_after.or(config.close_after_seconds);
    let outcome = arbiter.run(close_after).await?;
    tracing::info!(artifact_count = outcome.final_artifacts.len(), "pipeline run complete");
    Ok(())
}

async fn serve(config: &RuntimeConfig, close_after: Option<u64>, shutdown: ShutdownCoordinator) -> Result<(), PipelineError> {
    let redis_url = config
        .executor
        .redis_url
        .clone()
        .or_else(|| config.backend.redis_url.clone())
        .ok_or_else(|| PipelineError::config_error("serve requires executor.redis_url or backend.redis_url"))?;

    let registry = Arc::new(StageRegistry::new(ExecutorCallableRegistry::new()));
    let backend: Arc<dyn ArtifactBackend> = build_backend(config).await?;

    let server = WorkerServer::new(
        &redis_url,
        config.executor.task_queue.clone(),
        config.executor.result_queue_prefix.clone(),
        registry,
        backend,
    )
    .await?;

    if let Some(seconds) = close_after {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            shutdown.initiate_shutdown();
        });
    }

    server.run(shutdown.token()).await
}

async fn build_backend(config: &RuntimeConfig) -> Result<Arc<dyn ArtifactBackend>, PipelineError> {
    match config.backend.kind {
        BackendKind::Local => Ok(Arc::new(LocalArtifactBackend::new(config.backend.root.as_str())?)),
        BackendKind::Remote => {
            let redis_url = config
                .backend
                .redis_url
                .as_deref()
                .ok_or_else(|| PipelineError::config_error("backend.kind = remote requires backend.redis_url"))?;
            let backend = pipeline_core::infrastructure::backend::RemoteArtifactBackend::new(redis_url).await?;
            Ok(Arc::new(backend))
        }
    }
}

async fn build_executor(config: &RuntimeConfig, backend: Arc<dyn ArtifactBackend>) -> Result<Arc<dyn Executor>, PipelineError> {
    match config.executor.kind {
        ExecutorKind::Local => Ok(Arc::new(LocalExecutor::new())),
        ExecutorKind::Remote => {
            let redis_url = config
                .executor
                .redis_url
                .as_deref()
                .ok_or_else(|| PipelineError::config_error("executor.kind = remote requires executor.redis_url"))?;
            let executor = RemoteQueueExecutor::new(
                redis_url,
                config.executor.task_queue.clone(),
                config.executor.result_queue_prefix.clone(),
                backend,
            )
            .await?;
            Ok(Arc::new(executor))
        }
    }
}
