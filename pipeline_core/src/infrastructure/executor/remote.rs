// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Remote Queue Executor
//!
//! Publishes a stage's work as a [`TaskEnvelope`] onto a Redis list that
//! [`crate::infrastructure::worker::WorkerServer`] instances drain, then
//! polls a per-task result key until a [`TaskResult`] appears. Stages
//! marked local-only (anything that reads local filesystem state or
//! process-local parameters) never leave the submitting process; they run
//! through an embedded [`LocalExecutor`] instead, matching the fallback the
//! source system's remote executor made for the same reason.
//!
//! An input artifact's payload can be arbitrarily large (a whole file's
//! bytes); re-shipping it through the task queue on every remote dispatch
//! would duplicate whatever the backend already has stored under the
//! artifact's uid. [`TaskEnvelope::inputs`] therefore carries each input
//! with its payload stripped — everything a worker needs to address the
//! backend (stage, hashes, item type) but not the bytes themselves — and
//! [`crate::infrastructure::worker::WorkerServer`] rehydrates each one from
//! its own `backend` handle before running the stage.

use super::local::LocalExecutor;
use crate::infrastructure::retry::retry_redis;
use async_trait::async_trait;
use pipeline_domain::entities::{Artifact, StageConfig};
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::{ArtifactBackend, Executor, StageBehavior};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

/// The message a `RemoteQueueExecutor` pushes onto the task queue and a
/// worker pulls off of it. `inputs` carries each artifact with its payload
/// stripped (see module docs); a worker rehydrates from its backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: String,
    pub config: StageConfig,
    pub inputs: Vec<Artifact>,
    pub pipeline_run_id: String,
}

/// Clones `inputs` with every payload set to `None`, suitable for
/// publishing on the task queue without re-shipping bytes the backend
/// already has.
pub fn strip_payloads(inputs: &[Artifact]) -> Vec<Artifact> {
    inputs
        .iter()
        .map(|artifact| {
            let mut stripped = artifact.clone();
            stripped.item.payload = None;
            stripped
        })
        .collect()
}

/// What a worker writes back to the per-task result key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskResult {
    Ok(Vec<Artifact>),
    Err(String),
}

pub struct RemoteQueueExecutor {
    conn: ConnectionManager,
    task_queue: String,
    result_queue_prefix: String,
    local: LocalExecutor,
    backend: Arc<dyn ArtifactBackend>,
    poll_interval: Duration,
    max_wait: Duration,
}

impl RemoteQueueExecutor {
    pub async fn new(
        redis_url: &str,
        task_queue: impl Into<String>,
        result_queue_prefix: impl Into<String>,
        backend: Arc<dyn ArtifactBackend>,
    ) -> Result<Self, PipelineError> {
        let client = redis::Client::open(redis_url).map_err(redis_error("connect"))?;
        let conn = ConnectionManager::new(client).await.map_err(redis_error("connection manager"))?;
        Ok(Self {
            conn,
            task_queue: task_queue.into(),
            result_queue_prefix: result_queue_prefix.into(),
            local: LocalExecutor::new(),
            backend,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        })
    }

    pub fn with_local(mut self, local: LocalExecutor) -> Self {
        self.local = local;
        self
    }

    pub fn with_timing(mut self, poll_interval: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.max_wait = max_wait;
        self
    }

    fn result_key(&self, task_id: &str) -> String {
        format!("{}{}", self.result_queue_prefix, task_id)
    }

    /// Polls the result key until a [`TaskResult`] appears or `max_wait`
    /// elapses. A transient Redis fault on the `get`/`del` round trip is
    /// retried with backoff rather than failing the poll outright; an
    /// absent key is not an error, just a reason to sleep and poll again.
    async fn await_result(&self, task_id: &str) -> Result<TaskResult, PipelineError> {
        let key = self.result_key(task_id);
        let mut waited = Duration::ZERO;
        loop {
            let mut conn_for_get = self.conn.clone();
            let key_for_get = key.clone();
            let raw: Option<String> =
                retry_redis("get task result", async move || conn_for_get.get(&key_for_get).await).await?;
            if let Some(raw) = raw {
                let mut conn_for_del = self.conn.clone();
                let key_for_del = key.clone();
                retry_redis::<(), _>("del task result", async move || conn_for_del.del(&key_for_del).await).await?;
                return Ok(serde_json::from_str(&raw)?);
            }
            if waited >= self.max_wait {
                return Err(PipelineError::worker_failure(
                    task_id.to_string(),
                    format!("no result after {:?}", self.max_wait),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
            waited += self.poll_interval;
        }
    }
}

#[async_trait]
impl Executor for RemoteQueueExecutor {
    #[instrument(skip(self, stage, inputs), fields(stage = %config.name, inputs = inputs.len()))]
    async fn run_stage(
        &self,
        stage: Arc<dyn StageBehavior>,
        config: &StageConfig,
        inputs: Vec<Artifact>,
        pipeline_run_id: &str,
    ) -> Result<Vec<Artifact>, PipelineError> {
        if stage.is_local_only(config) {
            debug!("stage is local-only, bypassing task queue");
            return self.local.run_stage(stage, config, inputs, pipeline_run_id).await;
        }

        let definition_hash = pipeline_domain::services::hashing::definition_hash(config)?;
        let dependency_hash = pipeline_domain::services::hashing::dependency_hash(&inputs);
        let task_id = format!("{}:{definition_hash}:{dependency_hash}", config.name);

        let envelope = TaskEnvelope {
            task_id: task_id.clone(),
            config: config.clone(),
            inputs: strip_payloads(&inputs),
            pipeline_run_id: pipeline_run_id.to_string(),
        };
        let mut conn = self.conn.clone();
        let task_queue = self.task_queue.clone();
        let body = serde_json::to_string(&envelope)?;
        retry_redis::<(), _>("lpush task", async move || conn.lpush(&task_queue, &body).await).await?;
        debug!(task_id = %task_id, "published task to remote queue");

        match self.await_result(&task_id).await? {
            TaskResult::Ok(artifacts) => {
                let mut hydrated = Vec::with_capacity(artifacts.len());
                for mut artifact in artifacts {
                    artifact.remotely_produced = true;
                    if let Some(cached) = self.backend.find_cached_artifact(&artifact).await? {
                        artifact = cached;
                        artifact.remotely_produced = true;
                        artifact.loaded_from_cache = true;
                    }
                    hydrated.push(artifact);
                }
                Ok(hydrated)
            }
            TaskResult::Err(reason) => Err(PipelineError::worker_failure(config.name.to_string(), reason)),
        }
    }
}

fn redis_error(op: &'static str) -> impl Fn(redis::RedisError) -> PipelineError {
    move |e| PipelineError::Internal(format!("redis {op} failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_result_round_trips_through_json() {
        let ok = TaskResult::Ok(vec![]);
        let json = serde_json::to_string(&ok).unwrap();
        let back: TaskResult = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, TaskResult::Ok(artifacts) if artifacts.is_empty()));

        let err = TaskResult::Err("boom".to_string());
        let json = serde_json::to_string(&err).unwrap();
        let back: TaskResult = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, TaskResult::Err(reason) if reason == "boom"));
    }
}
