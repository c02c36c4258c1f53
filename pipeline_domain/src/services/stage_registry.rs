// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Registry
//!
//! Dispatches a [`StageConfig`]'s closed-set `kind` to its concrete
//! [`StageBehavior`]. There is no dynamic class synthesis here (unlike the
//! source system, which generates a Python subclass per config at load
//! time); each kind is a fixed, already-compiled behavior, and
//! `StageRegistry::behavior_for` is the only dispatch point.

use crate::entities::{Artifact, Item, StageConfig, StageKind};
use crate::error::PipelineError;
use crate::repositories::{CallableArgs, ExecutorCallableRegistry, ItemGroup, StageBehavior};
use crate::services::content_stream::{hash_and_close, BufferContentStream};
use crate::services::hashing::{definition_hash, serialize_payload, specific_hash_from_bytes};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Above this size, file bytes are hashed through a [`ContentStream`] rather
/// than all at once, exercising the `bytestream`/`stringstream` contract for
/// payloads large enough that it matters. Small files stay plain `string`
/// artifacts, matching the original's behavior for typical config/text
/// files.
const STREAM_THRESHOLD_BYTES: usize = 4096;

/// Builds the artifact for a file's bytes, choosing `string`, `stringstream`,
/// or `bytestream` per [`STREAM_THRESHOLD_BYTES`] and UTF-8 validity. Binary
/// files are hex-encoded rather than lossily mangled through
/// `String::from_utf8_lossy`.
async fn artifact_for_file_bytes(config: &StageConfig, bytes: Vec<u8>) -> Result<Artifact, PipelineError> {
    use crate::value_objects::SerializationType;
    let (item, serialization_type, specific_hash) = match std::str::from_utf8(&bytes) {
        Ok(text) if bytes.len() <= STREAM_THRESHOLD_BYTES => {
            let specific_hash = specific_hash_from_bytes(&bytes);
            (Item::new(serde_json::Value::String(text.to_string())), SerializationType::String, specific_hash)
        }
        Ok(text) => {
            let specific_hash = hash_and_close(Box::new(BufferContentStream::new(bytes.clone()))).await?;
            (Item::new(serde_json::Value::String(text.to_string())), SerializationType::Stringstream, specific_hash)
        }
        Err(_) => {
            let specific_hash = hash_and_close(Box::new(BufferContentStream::new(bytes.clone()))).await?;
            (Item::new(serde_json::Value::String(hex::encode(&bytes))), SerializationType::Bytestream, specific_hash)
        }
    };
    let mut artifact = base_artifact(config, item, serialization_type)?;
    artifact.specific_hash = Some(specific_hash);
    Ok(artifact)
}

/// Resolves a `StageConfig` to its `StageBehavior`. Stateless kinds
/// (`LocalFile`, `LocalDirectory`, `Parameter`, `GridSearch`, `Identity`)
/// are shared singletons; `Executor` carries the callable registry it was
/// built with.
#[derive(Clone)]
pub struct StageRegistry {
    callables: ExecutorCallableRegistry,
}

impl StageRegistry {
    pub fn new(callables: ExecutorCallableRegistry) -> Self {
        Self { callables }
    }

    pub fn behavior_for(&self, kind: &StageKind) -> Arc<dyn StageBehavior> {
        match kind {
            StageKind::LocalFile { .. } => Arc::new(LocalFileBehavior),
            StageKind::LocalDirectory { .. } => Arc::new(LocalDirectoryBehavior),
            StageKind::Parameter { .. } => Arc::new(ParameterBehavior),
            StageKind::GridSearch { .. } => Arc::new(GridSearchBehavior),
            StageKind::Identity => Arc::new(IdentityBehavior),
            StageKind::Executor { .. } => Arc::new(ExecutorBehavior {
                callables: self.callables.clone(),
            }),
        }
    }
}

fn base_artifact(config: &StageConfig, item: Item, serialization_type: crate::value_objects::SerializationType) -> Result<Artifact, PipelineError> {
    let def_hash = definition_hash(config)?;
    Ok(Artifact::new(config, item, serialization_type, def_hash))
}

struct ParameterBehavior;

#[async_trait]
impl StageBehavior for ParameterBehavior {
    async fn yield_artifacts(&self, config: &StageConfig, _inputs: &[Artifact]) -> Result<Vec<Artifact>, PipelineError> {
        let StageKind::Parameter { params } = &config.kind else {
            return Err(PipelineError::Internal("ParameterBehavior given non-Parameter config".into()));
        };
        let payload = serde_json::to_value(params)?;
        let mut artifact = base_artifact(config, Item::new(payload.clone()), crate::value_objects::SerializationType::Json)?;
        let bytes = serialize_payload(&payload, crate::value_objects::SerializationType::Json)?;
        artifact.specific_hash = Some(specific_hash_from_bytes(&bytes));
        Ok(vec![artifact])
    }
}

struct GridSearchBehavior;

#[async_trait]
impl StageBehavior for GridSearchBehavior {
    async fn yield_artifacts(&self, config: &StageConfig, _inputs: &[Artifact]) -> Result<Vec<Artifact>, PipelineError> {
        let StageKind::GridSearch { params } = &config.kind else {
            return Err(PipelineError::Internal("GridSearchBehavior given non-GridSearch config".into()));
        };
        let keys: Vec<&String> = params.keys().collect();
        let value_lists: Vec<&Vec<serde_json::Value>> = keys.iter().map(|k| &params[*k]).collect();
        let mut artifacts = Vec::new();
        for point in cartesian_product(&value_lists) {
            let mut payload = BTreeMap::new();
            let mut fanout = crate::value_objects::FanoutParameters::new();
            for (key, value) in keys.iter().zip(point.iter()) {
                payload.insert((*key).clone(), (*value).clone());
                fanout.insert((*key).clone(), (*value).clone());
            }
            let payload_value = serde_json::to_value(&payload)?;
            let mut artifact = base_artifact(config, Item::new(payload_value.clone()), crate::value_objects::SerializationType::Json)?;
            let bytes = serialize_payload(&payload_value, crate::value_objects::SerializationType::Json)?;
            artifact.specific_hash = Some(specific_hash_from_bytes(&bytes));
            artifact.fanout_parameters = fanout;
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }
}

fn cartesian_product(lists: &[&Vec<serde_json::Value>]) -> Vec<Vec<serde_json::Value>> {
    lists.iter().fold(vec![vec![]], |acc, list| {
        acc.into_iter()
            .flat_map(|prefix| {
                list.iter().map(move |value| {
                    let mut next = prefix.clone();
                    next.push(value.clone());
                    next
                })
            })
            .collect()
    })
}

struct LocalFileBehavior;

#[async_trait]
impl StageBehavior for LocalFileBehavior {
    async fn yield_artifacts(&self, config: &StageConfig, _inputs: &[Artifact]) -> Result<Vec<Artifact>, PipelineError> {
        let StageKind::LocalFile { filepath } = &config.kind else {
            return Err(PipelineError::Internal("LocalFileBehavior given non-LocalFile config".into()));
        };
        if !filepath.is_file() {
            return Err(PipelineError::source_missing(config.name.as_str(), filepath.clone()));
        }
        let bytes = std::fs::read(filepath)?;
        let artifact = artifact_for_file_bytes(config, bytes).await?;
        Ok(vec![artifact])
    }
}

struct LocalDirectoryBehavior;

#[async_trait]
impl StageBehavior for LocalDirectoryBehavior {
    async fn yield_artifacts(&self, config: &StageConfig, _inputs: &[Artifact]) -> Result<Vec<Artifact>, PipelineError> {
        let StageKind::LocalDirectory { filepath, binary_mode: _ } = &config.kind else {
            return Err(PipelineError::Internal("LocalDirectoryBehavior given non-LocalDirectory config".into()));
        };
        if !filepath.is_dir() {
            return Err(PipelineError::source_missing(config.name.as_str(), filepath.clone()));
        }
        let mut artifacts = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(filepath)?.filter_map(|e| e.ok()).collect();
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let artifact = artifact_for_file_bytes(config, bytes).await?;
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }
}

struct IdentityBehavior;

#[async_trait]
impl StageBehavior for IdentityBehavior {
    async fn yield_artifacts(&self, config: &StageConfig, inputs: &[Artifact]) -> Result<Vec<Artifact>, PipelineError> {
        let def_hash = definition_hash(config)?;
        Ok(inputs
            .iter()
            .map(|input| {
                let mut artifact = Artifact::new(config, input.item.clone(), input.serialization_type, def_hash.clone());
                artifact.specific_hash = input.specific_hash.clone();
                artifact
            })
            .collect())
    }
}

struct ExecutorBehavior {
    callables: ExecutorCallableRegistry,
}

#[async_trait]
impl StageBehavior for ExecutorBehavior {
    async fn yield_artifacts(&self, config: &StageConfig, inputs: &[Artifact]) -> Result<Vec<Artifact>, PipelineError> {
        let StageKind::Executor { execute, full_artifacts } = &config.kind else {
            return Err(PipelineError::Internal("ExecutorBehavior given non-Executor config".into()));
        };
        let callable = self.callables.get(execute)?;
        let args = group_inputs_by_stage(inputs, *full_artifacts);
        let items = callable.invoke(args).await?;
        let def_hash = definition_hash(config)?;
        let mut artifacts = Vec::with_capacity(items.len());
        for item in items {
            let serialization_type = crate::value_objects::SerializationType::Json;
            let payload = item.payload.clone().unwrap_or(serde_json::Value::Null);
            let bytes = serialize_payload(&payload, serialization_type)?;
            let mut artifact = base_artifact(config, item, serialization_type)?;
            artifact.definition_hash = def_hash.clone();
            artifact.specific_hash = Some(specific_hash_from_bytes(&bytes));
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }
}

/// Groups input artifacts by producing stage, matching the three
/// presentation shapes the callable contract documents: typed, flat
/// (untyped), or raw `Artifact`s when `full_artifacts` is set.
pub fn group_inputs_by_stage(inputs: &[Artifact], full_artifacts: bool) -> CallableArgs {
    let mut by_stage: HashMap<String, Vec<&Artifact>> = HashMap::new();
    for artifact in inputs {
        by_stage.entry(artifact.pipeline_stage.clone()).or_default().push(artifact);
    }

    let mut args = CallableArgs::new();
    for (stage, artifacts) in by_stage {
        if full_artifacts {
            args.insert(stage, ItemGroup::Artifacts(artifacts.into_iter().cloned().collect()));
            continue;
        }
        let all_untyped = artifacts.iter().all(|a| a.item.r#type.is_none());
        if all_untyped {
            args.insert(stage, ItemGroup::Flat(artifacts.into_iter().map(|a| a.item.clone()).collect()));
        } else {
            let mut typed: HashMap<String, Vec<Item>> = HashMap::new();
            for artifact in artifacts {
                let key = artifact.item.r#type.clone().unwrap_or_default();
                typed.entry(key).or_default().push(artifact.item.clone());
            }
            args.insert(stage, ItemGroup::Typed(typed));
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::StageName;

    #[test]
    fn grid_search_produces_cartesian_product_with_fanout_params() {
        let mut params = BTreeMap::new();
        params.insert("lr".to_string(), vec![serde_json::json!(0.1), serde_json::json!(0.2)]);
        params.insert("bs".to_string(), vec![serde_json::json!(8)]);
        let config = StageConfig::new(StageName::new("G").unwrap(), StageKind::GridSearch { params }, vec![]);
        let behavior = GridSearchBehavior;
        let artifacts = futures::executor::block_on(behavior.yield_artifacts(&config, &[])).unwrap();
        assert_eq!(artifacts.len(), 2);
        for artifact in &artifacts {
            assert!(artifact.fanout_parameters.get("lr").is_some());
            assert!(artifact.fanout_parameters.get("bs").is_some());
        }
    }

    #[test]
    fn group_inputs_by_stage_falls_back_to_flat_for_untyped_items() {
        let config = StageConfig::new(StageName::new("A").unwrap(), StageKind::Parameter { params: BTreeMap::new() }, vec![]);
        let a1 = Artifact::new(&config, Item::new(serde_json::json!(1)), crate::value_objects::SerializationType::Json, "d".into());
        let a2 = Artifact::new(&config, Item::new(serde_json::json!(2)), crate::value_objects::SerializationType::Json, "d".into());
        let grouped = group_inputs_by_stage(&[a1, a2], false);
        match grouped.get("A").unwrap() {
            ItemGroup::Flat(items) => assert_eq!(items.len(), 2),
            _ => panic!("expected flat group"),
        }
    }

    fn file_config(name: &str, path: std::path::PathBuf) -> StageConfig {
        StageConfig::new(StageName::new(name).unwrap(), StageKind::LocalFile { filepath: path }, vec![])
    }

    #[test]
    fn small_text_file_is_read_as_plain_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.txt");
        std::fs::write(&path, b"hello world").unwrap();
        let config = file_config("f", path);
        let artifact = futures::executor::block_on(LocalFileBehavior.yield_artifacts(&config, &[])).unwrap();
        assert_eq!(artifact[0].serialization_type, crate::value_objects::SerializationType::String);
        assert_eq!(artifact[0].item.payload, Some(serde_json::json!("hello world")));
    }

    #[test]
    fn large_text_file_streams_as_stringstream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.txt");
        let text = "a".repeat(STREAM_THRESHOLD_BYTES + 1);
        std::fs::write(&path, &text).unwrap();
        let config = file_config("f", path);
        let artifact = futures::executor::block_on(LocalFileBehavior.yield_artifacts(&config, &[])).unwrap();
        assert_eq!(artifact[0].serialization_type, crate::value_objects::SerializationType::Stringstream);
        assert_eq!(artifact[0].item.payload, Some(serde_json::json!(text)));
        assert!(artifact[0].specific_hash.is_some());
    }

    #[test]
    fn binary_file_is_hex_encoded_as_bytestream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        let bytes: Vec<u8> = vec![0xFF, 0x00, 0x80, 0xC0, 0xDE];
        std::fs::write(&path, &bytes).unwrap();
        let config = file_config("f", path);
        let artifact = futures::executor::block_on(LocalFileBehavior.yield_artifacts(&config, &[])).unwrap();
        assert_eq!(artifact[0].serialization_type, crate::value_objects::SerializationType::Bytestream);
        assert_eq!(artifact[0].item.payload, Some(serde_json::json!(hex::encode(&bytes))));
    }
}
