// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Remote Artifact Backend
//!
//! Redis-backed [`ArtifactBackend`] so multiple worker processes share one
//! cache layer. Keys:
//!
//! ```text
//! pipeline:artifact:payload:<uid>                      payload bytes
//! pipeline:artifact:meta:<stage>:<item_type>            hash of uid -> artifact metadata JSON
//! pipeline:stage_run:<stage>:<dependency_hash>:<definition_hash>
//!                                                        StageRunRecord JSON
//! ```
//!
//! There is no cross-key transaction: a save writes the payload, then the
//! metadata hash entry, then the run record, in that order, mirroring the
//! local backend's write-then-record sequencing. A reader that races a
//! writer can observe a run record without its payload for at most one
//! round trip; nothing in this crate treats that window as a correctness
//! problem since the scheduler only trusts a stage run once
//! `log_pipeline_stage_run_complete` has returned.
//!
//! The run record itself *is* a correctness problem under concurrent
//! writers: unlike the local backend, which serializes every write behind
//! one process-wide lock, multiple workers can update the same run
//! record's key at once. [`Self::cas_update_run_record`] guards every
//! read-modify-write against that with a Lua script that only applies the
//! new value if the key still holds what was read, retrying with backoff
//! on a lost race and giving up as [`PipelineError::RaceLost`] after
//! [`MAX_CAS_ATTEMPTS`].

use crate::infrastructure::retry::{backoff_delay, retry_redis};
use async_trait::async_trait;
use pipeline_domain::entities::{Artifact, StageConfig, StageRunRecord, StageRunStatus};
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::ArtifactBackend;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "pipeline:";
const MAX_CAS_ATTEMPTS: u32 = 5;

/// Applies `new` to `key` only if `key` still holds `expected` (or is
/// absent and `expected` is empty). Returns 1 on success, 0 on a lost race.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if (current == false and ARGV[1] == '') or (current == ARGV[1]) then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
else
    return 0
end
"#;

pub struct RemoteArtifactBackend {
    conn: ConnectionManager,
}

impl RemoteArtifactBackend {
    pub async fn new(redis_url: &str) -> Result<Self, PipelineError> {
        let client = redis::Client::open(redis_url).map_err(redis_error("connect"))?;
        let conn = ConnectionManager::new(client).await.map_err(redis_error("connection manager"))?;
        Ok(Self { conn })
    }

    fn item_type(artifact: &Artifact) -> String {
        artifact.item.r#type.clone().unwrap_or_else(|| "default".to_string())
    }

    fn payload_key(uid: &str) -> String {
        format!("{KEY_PREFIX}artifact:payload:{uid}")
    }

    fn meta_key(stage: &str, item_type: &str) -> String {
        format!("{KEY_PREFIX}artifact:meta:{stage}:{item_type}")
    }

    fn run_key(stage: &str, dependency_hash: &str, definition_hash: &str) -> String {
        format!("{KEY_PREFIX}stage_run:{stage}:{dependency_hash}:{definition_hash}")
    }

    async fn load_metadata(&self, stage: &str, item_type: &str, uid: &str) -> Result<Option<Artifact>, PipelineError> {
        let mut conn = self.conn.clone();
        let key = Self::meta_key(stage, item_type);
        let uid = uid.to_string();
        let raw: Option<String> = retry_redis("hget artifact meta", async move || conn.hget(&key, &uid).await).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(PipelineError::from)).transpose()
    }

    async fn load_run_record(&self, stage: &str, dependency_hash: &str, definition_hash: &str) -> Result<Option<StageRunRecord>, PipelineError> {
        let mut conn = self.conn.clone();
        let key = Self::run_key(stage, dependency_hash, definition_hash);
        let raw: Option<String> = retry_redis("get stage run record", async move || conn.get(&key).await).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(PipelineError::from)).transpose()
    }

    /// Reads the run record at `key`, applies `mutate` to it, and writes the
    /// result back only if nothing else changed the record in between,
    /// retrying the whole read-modify-write up to [`MAX_CAS_ATTEMPTS`]
    /// times on a lost race.
    async fn cas_update_run_record(
        &self,
        stage: &str,
        dependency_hash: &str,
        definition_hash: &str,
        mutate: impl Fn(Option<StageRunRecord>) -> StageRunRecord,
    ) -> Result<(), PipelineError> {
        let key = Self::run_key(stage, dependency_hash, definition_hash);
        let script = redis::Script::new(CAS_SCRIPT);

        for attempt in 0..MAX_CAS_ATTEMPTS {
            let mut conn_for_get = self.conn.clone();
            let key_for_get = key.clone();
            let current_json: Option<String> =
                retry_redis("get stage run record", async move || conn_for_get.get(&key_for_get).await).await?;
            let current_record = current_json.as_deref().map(serde_json::from_str).transpose()?;
            let next = mutate(current_record);
            let next_json = serde_json::to_string(&next)?;
            let expected = current_json.unwrap_or_default();

            let mut conn = self.conn.clone();
            let key = key.clone();
            let script = script.clone();
            let next_json = next_json.clone();
            let expected = expected.clone();
            let applied: i64 = retry_redis("cas stage run record", async move || {
                script.key(&key).arg(&expected).arg(&next_json).invoke_async(&mut conn).await
            })
            .await?;

            if applied == 1 {
                return Ok(());
            }
            warn!(stage, dependency_hash, definition_hash, attempt, "lost cas race updating stage run record, retrying");
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        Err(PipelineError::RaceLost { attempts: MAX_CAS_ATTEMPTS })
    }
}

#[async_trait]
impl ArtifactBackend for RemoteArtifactBackend {
    async fn save_artifact(&self, artifact: &Artifact) -> Result<(), PipelineError> {
        let payload = artifact
            .item
            .payload
            .as_ref()
            .ok_or_else(|| PipelineError::missing_payload(artifact.pipeline_stage.clone()))?;
        let bytes = pipeline_domain::services::hashing::serialize_payload(payload, artifact.serialization_type)?;

        let uid = artifact.uid().to_string();
        let item_type = Self::item_type(artifact);
        let mut conn_for_set = self.conn.clone();
        let payload_key = Self::payload_key(&uid);
        retry_redis::<(), _>("set artifact payload", async move || conn_for_set.set(&payload_key, &bytes).await).await?;
        let mut conn_for_hset = self.conn.clone();
        let meta_key = Self::meta_key(&artifact.pipeline_stage, &item_type);
        let meta_json = serde_json::to_string(artifact)?;
        let uid_for_hset = uid.clone();
        retry_redis::<(), _>("hset artifact meta", async move || conn_for_hset.hset(&meta_key, &uid_for_hset, &meta_json).await).await?;

        let entry = pipeline_domain::entities::StageRunArtifactEntry {
            uid: uid.clone(),
            item_type: artifact.item.r#type.clone(),
            specific_hash: artifact.specific_hash.clone().unwrap_or_default(),
        };
        self.cas_update_run_record(&artifact.pipeline_stage, &artifact.dependency_hash, &artifact.definition_hash, move |existing| {
            let mut record = existing
                .unwrap_or_else(|| StageRunRecord::new(artifact.definition_hash.clone(), artifact.dependency_hash.clone()));
            record.record_artifact(entry.clone());
            record
        })
        .await?;

        debug!(stage = %artifact.pipeline_stage, uid = %uid, "saved artifact to redis");
        Ok(())
    }

    async fn load_artifact(&self, artifact: &Artifact) -> Result<Option<Artifact>, PipelineError> {
        let Some(found) = self.find_cached_artifact(artifact).await? else {
            return Ok(None);
        };
        let mut conn = self.conn.clone();
        let payload_key = Self::payload_key(found.uid().as_str());
        let bytes: Option<Vec<u8>> = retry_redis("get artifact payload", async move || conn.get(&payload_key).await).await?;
        let Some(bytes) = bytes else {
            return Err(PipelineError::Corruption { uid: found.uid().to_string() });
        };
        let mut hydrated = found;
        hydrated.item.payload = Some(decode_payload(&bytes, hydrated.serialization_type)?);
        Ok(Some(hydrated))
    }

    async fn find_cached_artifact(&self, artifact: &Artifact) -> Result<Option<Artifact>, PipelineError> {
        self.load_metadata(&artifact.pipeline_stage, &Self::item_type(artifact), artifact.uid().as_str()).await
    }

    async fn find_pipeline_stage_run_artifacts(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let definition_hash = pipeline_domain::services::hashing::definition_hash(config)?;
        let Some(record) = self.load_run_record(config.name.as_str(), dependency_hash, &definition_hash).await? else {
            return Ok(Vec::new());
        };

        let mut by_item_type: HashMap<Option<String>, HashMap<String, Artifact>> = HashMap::new();
        let mut artifacts = Vec::with_capacity(record.artifacts.len());
        for entry in &record.artifacts {
            if !by_item_type.contains_key(&entry.item_type) {
                let item_type = entry.item_type.clone().unwrap_or_else(|| "default".to_string());
                let mut conn = self.conn.clone();
                let meta_key = Self::meta_key(config.name.as_str(), &item_type);
                let raw: HashMap<String, String> =
                    retry_redis("hgetall artifact meta", async move || conn.hgetall(&meta_key).await).await?;
                let mut parsed = HashMap::with_capacity(raw.len());
                for (uid, json) in raw {
                    parsed.insert(uid, serde_json::from_str(&json)?);
                }
                by_item_type.insert(entry.item_type.clone(), parsed);
            }
            if let Some(found) = by_item_type.get(&entry.item_type).and_then(|m| m.get(&entry.uid)) {
                artifacts.push(found.clone());
            }
        }
        Ok(artifacts)
    }

    async fn pipeline_stage_run_status(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<StageRunStatus, PipelineError> {
        let definition_hash = pipeline_domain::services::hashing::definition_hash(config)?;
        Ok(self
            .load_run_record(config.name.as_str(), dependency_hash, &definition_hash)
            .await?
            .map(|r| r.status())
            .unwrap_or(StageRunStatus::DoesNotExist))
    }

    async fn log_pipeline_stage_run_complete(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<(), PipelineError> {
        let definition_hash = pipeline_domain::services::hashing::definition_hash(config)?;
        self.cas_update_run_record(config.name.as_str(), dependency_hash, &definition_hash, |existing| {
            let mut record =
                existing.unwrap_or_else(|| StageRunRecord::new(definition_hash.clone(), dependency_hash.to_string()));
            record.complete = true;
            record
        })
        .await
    }
}

fn decode_payload(bytes: &[u8], serialization_type: pipeline_domain::value_objects::SerializationType) -> Result<serde_json::Value, PipelineError> {
    use pipeline_domain::value_objects::SerializationType;
    match serialization_type {
        SerializationType::Json => Ok(serde_json::from_slice(bytes)?),
        SerializationType::String | SerializationType::Stringstream => {
            Ok(serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
        }
        SerializationType::Bytestream => Ok(serde_json::Value::String(hex::encode(bytes))),
    }
}

fn redis_error(op: &'static str) -> impl Fn(redis::RedisError) -> PipelineError {
    move |e| PipelineError::Internal(format!("redis {op} failed: {e}"))
}
