// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker Server
//!
//! Long-running consumer of [`RemoteQueueExecutor`](crate::infrastructure::executor::remote)'s
//! task queue. Rebuilds each stage locally, runs it, saves the produced
//! artifacts, and publishes a completion message back so the remote
//! executor's result poller can hand them to the waiting caller.

use crate::infrastructure::executor::{LocalExecutor, TaskEnvelope, TaskResult};
use crate::infrastructure::retry::retry_redis;
use pipeline_bootstrap::shutdown::CancellationToken;
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::{ArtifactBackend, Executor};
use pipeline_domain::services::hashing::dependency_hash;
use pipeline_domain::services::stage_registry::StageRegistry;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Coarse lifecycle of one job this server has pulled off the task queue,
/// kept around only so operators can inspect the server's recent history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: u64,
    pub stage: String,
    pub status: JobStatus,
}

/// Internal job table keyed by a monotonically increasing id, so the
/// server's `/healthz`-style summary can report recent activity without a
/// database.
#[derive(Default)]
struct JobTable {
    next_id: AtomicU64,
    recent: Mutex<Vec<JobRecord>>,
}

const JOB_TABLE_CAPACITY: usize = 256;

impl JobTable {
    fn start(&self, stage: &str) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut recent = self.recent.lock().unwrap();
        recent.push(JobRecord {
            id,
            stage: stage.to_string(),
            status: JobStatus::Running,
        });
        if recent.len() > JOB_TABLE_CAPACITY {
            recent.remove(0);
        }
        id
    }

    fn finish(&self, id: u64, status: JobStatus) {
        let mut recent = self.recent.lock().unwrap();
        if let Some(record) = recent.iter_mut().find(|r| r.id == id) {
            record.status = status;
        }
    }

    fn snapshot(&self) -> Vec<JobRecord> {
        self.recent.lock().unwrap().clone()
    }
}

pub struct WorkerServer {
    conn: ConnectionManager,
    task_queue: String,
    result_queue_prefix: String,
    registry: Arc<StageRegistry>,
    backend: Arc<dyn ArtifactBackend>,
    local: LocalExecutor,
    jobs: Arc<JobTable>,
}

impl WorkerServer {
    pub async fn new(
        redis_url: &str,
        task_queue: impl Into<String>,
        result_queue_prefix: impl Into<String>,
        registry: Arc<StageRegistry>,
        backend: Arc<dyn ArtifactBackend>,
    ) -> Result<Self, PipelineError> {
        let client = redis::Client::open(redis_url).map_err(|e| PipelineError::Internal(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| PipelineError::Internal(format!("redis connection failed: {e}")))?;
        Ok(Self {
            conn,
            task_queue: task_queue.into(),
            result_queue_prefix: result_queue_prefix.into(),
            registry,
            backend,
            local: LocalExecutor::new(),
            jobs: Arc::new(JobTable::default()),
        })
    }

    pub fn job_table_snapshot(&self) -> Vec<JobRecord> {
        self.jobs.snapshot()
    }

    fn result_key(&self, task_id: &str) -> String {
        format!("{}:{}", self.result_queue_prefix, task_id)
    }

    /// The receive loop: pulls one task at a time, runs it, and publishes
    /// its completion, looping until `cancel` fires. A transient Redis
    /// fault on either side of a task (the pull or the result publish) is
    /// retried with backoff before being promoted to fatal; a task that
    /// fails deterministically (e.g. a user callable panic surfaced as
    /// `WorkerFailure`) is reported back as a failed completion instead of
    /// being retried forever.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), PipelineError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let mut conn = self.conn.clone();
            let task_queue = self.task_queue.clone();
            let popped: Option<(String, String)> = tokio::select! {
                result = retry_redis("blpop task queue", async move || conn.blpop(&task_queue, 1.0).await) => result?,
                _ = cancel.cancelled() => return Ok(()),
            };
            let Some((_, body)) = popped else {
                continue;
            };
            let envelope: TaskEnvelope = match serde_json::from_str(&body) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::error!(error = %err, "dropping malformed task envelope");
                    continue;
                }
            };
            self.process_task(envelope).await?;
        }
    }

    async fn process_task(&mut self, envelope: TaskEnvelope) -> Result<(), PipelineError> {
        let job_id = self.jobs.start(&envelope.config.name.to_string());
        let result_key = self.result_key(&envelope.task_id);

        let outcome = self.execute(&envelope).await;
        let task_result = match outcome {
            Ok(artifacts) => {
                self.jobs.finish(job_id, JobStatus::Completed);
                TaskResult::Ok(artifacts)
            }
            Err(err) => {
                self.jobs.finish(job_id, JobStatus::Failed(err.to_string()));
                TaskResult::Err(err.to_string())
            }
        };

        let body = serde_json::to_string(&task_result)?;
        let mut conn = self.conn.clone();
        retry_redis("set task result", async move || conn.set(&result_key, &body).await).await
    }

    /// Rehydrates each input's payload from the backend by uid. Inputs
    /// arrive with their payload stripped (see
    /// [`crate::infrastructure::executor::remote`]'s module docs); a uid
    /// the backend has never seen a payload for is a fatal
    /// `PayloadMissing`, not something this worker can route around.
    async fn rehydrate_inputs(
        &self,
        stage: &str,
        inputs: &[pipeline_domain::entities::Artifact],
    ) -> Result<Vec<pipeline_domain::entities::Artifact>, PipelineError> {
        let mut hydrated = Vec::with_capacity(inputs.len());
        for input in inputs {
            if input.item.payload.is_some() {
                hydrated.push(input.clone());
                continue;
            }
            let loaded = self
                .backend
                .load_artifact(input)
                .await?
                .ok_or_else(|| PipelineError::payload_missing(stage.to_string(), input.uid().to_string()))?;
            hydrated.push(loaded);
        }
        Ok(hydrated)
    }

    async fn execute(&mut self, envelope: &TaskEnvelope) -> Result<Vec<pipeline_domain::entities::Artifact>, PipelineError> {
        let behavior = self.registry.behavior_for(&envelope.config.kind);
        let inputs = self.rehydrate_inputs(envelope.config.name.as_str(), &envelope.inputs).await?;
        let mut artifacts = self
            .local
            .run_stage(behavior, &envelope.config, inputs, &envelope.pipeline_run_id)
            .await?;

        let dep_hash = dependency_hash(&envelope.inputs);
        let creation_time = now_unix_seconds();
        for artifact in &mut artifacts {
            artifact.ensure_run_metadata(creation_time, &dep_hash);
            self.backend.save_artifact(artifact).await?;
        }
        self.backend.log_pipeline_stage_run_complete(&envelope.config, &dep_hash).await?;
        Ok(artifacts)
    }
}

fn now_unix_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}

pub fn describe_recent_jobs(jobs: &[JobRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for job in jobs {
        let key = match &job.status {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed(_) => "failed",
        };
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_table_tracks_start_and_finish() {
        let table = JobTable::default();
        let id = table.start("A");
        assert_eq!(table.snapshot().len(), 1);
        table.finish(id, JobStatus::Completed);
        assert_eq!(table.snapshot()[0].status, JobStatus::Completed);
    }

    #[test]
    fn describe_recent_jobs_counts_by_status() {
        let jobs = vec![
            JobRecord {
                id: 1,
                stage: "A".into(),
                status: JobStatus::Completed,
            },
            JobRecord {
                id: 2,
                stage: "A".into(),
                status: JobStatus::Failed("boom".into()),
            },
        ];
        let counts = describe_recent_jobs(&jobs);
        assert_eq!(counts.get("completed"), Some(&1));
        assert_eq!(counts.get("failed"), Some(&1));
    }
}
