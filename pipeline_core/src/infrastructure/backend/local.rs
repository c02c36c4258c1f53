// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Local Artifact Backend
//!
//! Persists artifacts under a root directory:
//!
//! ```text
//! <root>/<stage>/<item_type>/<uid>          payload bytes
//! <root>/<stage>/<item_type>/pipeline.meta  {uid: artifact metadata}, shared per stage+type
//! <root>/<stage>/pipeline_stage_run_<dependency_hash>_<definition_hash>
//!                                            stage run record (StageRunRecord)
//! ```
//!
//! A single process-wide write lock serializes writes; the bulk of a run's
//! wall-clock time is spent generating artifacts, not persisting them, so
//! this has not been worth relaxing to per-file locking. Every filesystem
//! call runs on a blocking-pool thread via [`tokio::task::spawn_blocking`]
//! so a slow disk never stalls the scheduler's other work.

use async_trait::async_trait;
use parking_lot::Mutex;
use pipeline_domain::entities::{Artifact, StageConfig, StageRunRecord, StageRunStatus};
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::ArtifactBackend;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const METADATA_FILE: &str = "pipeline.meta";

pub struct LocalArtifactBackend {
    root: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

/// Runs a synchronous closure on the blocking thread pool, surfacing a
/// panicked task the same way any other internal fault is surfaced.
async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Internal(format!("artifact backend blocking task panicked: {e}")))?
}

impl LocalArtifactBackend {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn item_type(artifact: &Artifact) -> String {
        artifact.item.r#type.clone().unwrap_or_else(|| "default".to_string())
    }

    fn artifact_dir(&self, artifact: &Artifact) -> PathBuf {
        self.root.join(&artifact.pipeline_stage).join(Self::item_type(artifact))
    }

    fn artifact_path(&self, artifact: &Artifact) -> PathBuf {
        self.artifact_dir(artifact).join(artifact.uid().as_str())
    }

    fn metadata_path(&self, artifact: &Artifact) -> PathBuf {
        self.artifact_dir(artifact).join(METADATA_FILE)
    }

    fn run_record_path(&self, stage: &str, dependency_hash: &str, definition_hash: &str) -> PathBuf {
        self.root
            .join(stage)
            .join(format!("pipeline_stage_run_{dependency_hash}_{definition_hash}"))
    }

    fn load_item_metadata(path: &Path) -> Result<HashMap<String, Artifact>, PipelineError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_item_metadata(path: &Path, metadata: &HashMap<String, Artifact>) -> Result<(), PipelineError> {
        std::fs::create_dir_all(path.parent().expect("metadata path always has a parent"))?;
        std::fs::write(path, serde_json::to_vec(metadata)?)?;
        Ok(())
    }

    fn load_run_record(path: &Path) -> Result<Option<StageRunRecord>, PipelineError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_run_record(path: &Path, record: &StageRunRecord) -> Result<(), PipelineError> {
        std::fs::create_dir_all(path.parent().expect("run record path always has a parent"))?;
        std::fs::write(path, serde_json::to_vec(record)?)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactBackend for LocalArtifactBackend {
    async fn save_artifact(&self, artifact: &Artifact) -> Result<(), PipelineError> {
        let payload = artifact
            .item
            .payload
            .as_ref()
            .ok_or_else(|| PipelineError::missing_payload(artifact.pipeline_stage.clone()))?;
        let bytes = pipeline_domain::services::hashing::serialize_payload(payload, artifact.serialization_type)?;

        let artifact_dir = self.artifact_dir(artifact);
        let artifact_path = self.artifact_path(artifact);
        let metadata_path = self.metadata_path(artifact);
        let run_path = self.run_record_path(&artifact.pipeline_stage, &artifact.dependency_hash, &artifact.definition_hash);
        let artifact = artifact.clone();
        let write_lock = self.write_lock.clone();

        blocking(move || {
            let _guard = write_lock.lock();
            std::fs::create_dir_all(&artifact_dir)?;
            std::fs::write(&artifact_path, &bytes)?;

            let mut metadata = Self::load_item_metadata(&metadata_path)?;
            metadata.insert(artifact.uid().to_string(), artifact.clone());
            Self::write_item_metadata(&metadata_path, &metadata)?;

            let mut record = Self::load_run_record(&run_path)?
                .unwrap_or_else(|| StageRunRecord::new(artifact.definition_hash.clone(), artifact.dependency_hash.clone()));
            record.record_artifact(pipeline_domain::entities::StageRunArtifactEntry {
                uid: artifact.uid().to_string(),
                item_type: artifact.item.r#type.clone(),
                specific_hash: artifact.specific_hash.clone().unwrap_or_default(),
            });
            Self::write_run_record(&run_path, &record)?;

            debug!(stage = %artifact.pipeline_stage, uid = %artifact.uid(), "saved artifact");
            Ok(())
        })
        .await
    }

    async fn load_artifact(&self, artifact: &Artifact) -> Result<Option<Artifact>, PipelineError> {
        let Some(found) = self.find_cached_artifact(artifact).await? else {
            return Ok(None);
        };
        let artifact_path = self.artifact_path(&found);
        let uid = found.uid().to_string();
        let bytes = blocking(move || match std::fs::read(&artifact_path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::Corruption { uid }),
            Err(e) => Err(e.into()),
        })
        .await?;
        let mut hydrated = found;
        hydrated.item.payload = Some(decode_payload(&bytes, hydrated.serialization_type)?);
        Ok(Some(hydrated))
    }

    async fn find_cached_artifact(&self, artifact: &Artifact) -> Result<Option<Artifact>, PipelineError> {
        let metadata_path = self.metadata_path(artifact);
        let uid = artifact.uid().to_string();
        blocking(move || {
            let metadata = Self::load_item_metadata(&metadata_path)?;
            Ok(metadata.get(uid.as_str()).cloned())
        })
        .await
    }

    async fn find_pipeline_stage_run_artifacts(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let definition_hash = pipeline_domain::services::hashing::definition_hash(config)?;
        let run_path = self.run_record_path(config.name.as_str(), dependency_hash, &definition_hash);
        let stage_dir = self.root.join(config.name.as_str());

        blocking(move || {
            let Some(record) = Self::load_run_record(&run_path)? else {
                return Ok(Vec::new());
            };

            let mut by_item_type: HashMap<Option<String>, HashMap<String, Artifact>> = HashMap::new();
            let mut artifacts = Vec::with_capacity(record.artifacts.len());
            for entry in &record.artifacts {
                let metadata = by_item_type.entry(entry.item_type.clone()).or_insert_with(|| {
                    let item_type = entry.item_type.clone().unwrap_or_else(|| "default".to_string());
                    Self::load_item_metadata(&stage_dir.join(item_type).join(METADATA_FILE)).unwrap_or_default()
                });
                if let Some(found) = metadata.get(&entry.uid) {
                    artifacts.push(found.clone());
                }
            }
            Ok(artifacts)
        })
        .await
    }

    async fn pipeline_stage_run_status(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<StageRunStatus, PipelineError> {
        let definition_hash = pipeline_domain::services::hashing::definition_hash(config)?;
        let run_path = self.run_record_path(config.name.as_str(), dependency_hash, &definition_hash);
        blocking(move || Ok(Self::load_run_record(&run_path)?.map(|r| r.status()).unwrap_or(StageRunStatus::DoesNotExist))).await
    }

    async fn log_pipeline_stage_run_complete(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<(), PipelineError> {
        let definition_hash = pipeline_domain::services::hashing::definition_hash(config)?;
        let run_path = self.run_record_path(config.name.as_str(), dependency_hash, &definition_hash);
        let dependency_hash = dependency_hash.to_string();
        let write_lock = self.write_lock.clone();

        blocking(move || {
            let _guard = write_lock.lock();
            let mut record = Self::load_run_record(&run_path)?.unwrap_or_else(|| StageRunRecord::new(definition_hash.clone(), dependency_hash));
            record.complete = true;
            Self::write_run_record(&run_path, &record)
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

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_domain::entities::{Item, StageKind};
    use pipeline_domain::value_objects::{SerializationType, StageName};
    use std::collections::BTreeMap;

    fn test_config() -> StageConfig {
        StageConfig::new(StageName::new("Stage").unwrap(), StageKind::Parameter { params: BTreeMap::new() }, vec![])
    }

    fn test_artifact(config: &StageConfig, payload: serde_json::Value) -> Artifact {
        let mut artifact = Artifact::new(config, Item::new(payload.clone()), SerializationType::Json, "def".into());
        let bytes = pipeline_domain::services::hashing::serialize_payload(&payload, SerializationType::Json).unwrap();
        artifact.specific_hash = Some(pipeline_domain::services::hashing::specific_hash_from_bytes(&bytes));
        artifact.dependency_hash = pipeline_domain::services::hashing::EMPTY_DEPENDENCY_HASH.to_string();
        artifact
    }

    #[tokio::test]
    async fn round_trips_payload_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalArtifactBackend::new(dir.path()).unwrap();
        let config = test_config();
        let artifact = test_artifact(&config, serde_json::json!({"a": 1}));

        backend.save_artifact(&artifact).await.unwrap();
        let loaded = backend.load_artifact(&artifact).await.unwrap().unwrap();
        assert_eq!(loaded.item.payload, Some(serde_json::json!({"a": 1})));
    }

    #[tokio::test]
    async fn round_trips_bytestream_payload_as_hex() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalArtifactBackend::new(dir.path()).unwrap();
        let config = test_config();
        let hex_payload = serde_json::json!(hex::encode([0xDE, 0xAD, 0xBE, 0xEF]));
        let mut artifact = Artifact::new(&config, Item::new(hex_payload.clone()), SerializationType::Bytestream, "def".into());
        let bytes = pipeline_domain::services::hashing::serialize_payload(&hex_payload, SerializationType::Bytestream).unwrap();
        artifact.specific_hash = Some(pipeline_domain::services::hashing::specific_hash_from_bytes(&bytes));
        artifact.dependency_hash = pipeline_domain::services::hashing::EMPTY_DEPENDENCY_HASH.to_string();

        backend.save_artifact(&artifact).await.unwrap();
        let loaded = backend.load_artifact(&artifact).await.unwrap().unwrap();
        assert_eq!(loaded.item.payload, Some(hex_payload));
    }

    #[tokio::test]
    async fn missing_artifact_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalArtifactBackend::new(dir.path()).unwrap();
        let config = test_config();
        let artifact = test_artifact(&config, serde_json::json!(null));
        assert!(backend.load_artifact(&artifact).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_status_transitions_from_does_not_exist_to_complete() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalArtifactBackend::new(dir.path()).unwrap();
        let config = test_config();
        let dependency_hash = pipeline_domain::services::hashing::EMPTY_DEPENDENCY_HASH;

        assert_eq!(
            backend.pipeline_stage_run_status(&config, dependency_hash).await.unwrap(),
            StageRunStatus::DoesNotExist
        );

        let artifact = test_artifact(&config, serde_json::json!(1));
        backend.save_artifact(&artifact).await.unwrap();
        assert_eq!(
            backend.pipeline_stage_run_status(&config, dependency_hash).await.unwrap(),
            StageRunStatus::InProgress
        );

        backend.log_pipeline_stage_run_complete(&config, dependency_hash).await.unwrap();
        assert_eq!(
            backend.pipeline_stage_run_status(&config, dependency_hash).await.unwrap(),
            StageRunStatus::Complete
        );
    }
}
