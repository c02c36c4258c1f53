// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Content-Addressed Hashing Algebra
//!
//! The three hashes that compose an [`ArtifactUid`](crate::value_objects::ArtifactUid):
//! `definition_hash` (identifies a stage's configuration),
//! `specific_hash` (identifies a payload's bytes), and `dependency_hash`
//! (identifies an unordered set of input artifacts). All three are stable
//! 128-bit digests of a canonical byte encoding, truncated from SHA-256 so
//! hex strings stay short without adding another hashing crate to the
//! dependency graph.

use crate::entities::{Artifact, StageConfig};
use crate::error::PipelineError;
use crate::value_objects::{ArtifactUid, SerializationType};
use sha2::{Digest, Sha256};

/// Sentinel `dependency_hash` for a stage with no inputs (leaf stages).
pub const EMPTY_DEPENDENCY_HASH: &str = "00000000000000000000000000000000";

/// Placeholder `dependency_hash` on a freshly constructed [`Artifact`]
/// before [`Artifact::ensure_run_metadata`] fills in the real value for the
/// run it belongs to. Distinct from [`EMPTY_DEPENDENCY_HASH`], which is
/// itself a legitimate dependency hash for a leaf stage with no inputs.
pub const UNSET_DEPENDENCY_HASH: &str = "unset";

fn stable_hash_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..16])
}

/// Stable hash of a stage's canonical JSON configuration.
pub fn definition_hash(config: &StageConfig) -> Result<String, PipelineError> {
    let canonical = canonical_json(&serde_json::to_value(config)?)?;
    Ok(stable_hash_hex(canonical.as_bytes()))
}

/// Stable hash of a payload already serialized to bytes.
pub fn specific_hash_from_bytes(bytes: &[u8]) -> String {
    stable_hash_hex(bytes)
}

/// Stable, order-independent hash over a set of input artifacts. Artifacts
/// are sorted by UID before hashing so `dependency_hash({a, b}) ==
/// dependency_hash({b, a})`.
pub fn dependency_hash(inputs: &[Artifact]) -> String {
    if inputs.is_empty() {
        return EMPTY_DEPENDENCY_HASH.to_string();
    }
    let mut uids: Vec<String> = inputs.iter().map(|a| a.uid().to_string()).collect();
    uids.sort_unstable();
    let joined = uids.join("");
    stable_hash_hex(joined.as_bytes())
}

/// Serializes a payload per its declared [`SerializationType`] into bytes
/// suitable for hashing or persisting.
///
/// `bytestream`/`stringstream` payloads are expected to have already been
/// drained through a `ContentStream` (see
/// [`crate::services::content_stream::hash_and_close`]) by the stage
/// behavior that produced them; by the time they reach here they're stored
/// the same way any other JSON-backed payload is: `bytestream` as a hex
/// string, `stringstream` as plain text.
pub fn serialize_payload(
    payload: &serde_json::Value,
    serialization_type: SerializationType,
) -> Result<Vec<u8>, PipelineError> {
    match serialization_type {
        SerializationType::Json => Ok(canonical_json(payload)?.into_bytes()),
        SerializationType::String | SerializationType::Stringstream => match payload.as_str() {
            Some(s) => Ok(s.as_bytes().to_vec()),
            None => Err(PipelineError::config_error(
                "string serialization requires a string payload",
            )),
        },
        SerializationType::Bytestream => match payload.as_str() {
            Some(hex_str) => hex::decode(hex_str)
                .map_err(|e| PipelineError::config_error(format!("bytestream payload is not valid hex: {e}"))),
            None => Err(PipelineError::config_error(
                "bytestream serialization requires a hex-encoded string payload",
            )),
        },
    }
}

/// Canonical JSON text: object keys sorted, no insignificant whitespace.
/// `serde_json::Value` backed by a `BTreeMap`-equivalent ordering is not
/// guaranteed by default (it preserves insertion order unless the
/// `preserve_order` feature is active), so keys are re-sorted explicitly.
pub fn canonical_json(value: &serde_json::Value) -> Result<String, PipelineError> {
    let sorted = sort_keys(value.clone());
    Ok(serde_json::to_string(&sorted)?)
}

fn sort_keys(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            for key in keys {
                let v = map.get(&key).cloned().unwrap_or(serde_json::Value::Null);
                sorted.insert(key, sort_keys(v));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_keys).collect())
        }
        other => other,
    }
}

pub fn build_uid(definition_hash: &str, specific_hash: &str, dependency_hash: &str) -> ArtifactUid {
    ArtifactUid::new(definition_hash, specific_hash, dependency_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Item, StageConfig, StageKind};
    use std::collections::BTreeMap;

    fn artifact(definition: &str, specific: &str) -> Artifact {
        let config = StageConfig::new(
            crate::value_objects::StageName::new("A").unwrap(),
            StageKind::Parameter {
                params: BTreeMap::new(),
            },
            vec![],
        );
        let mut a = Artifact::new(
            &config,
            Item::new(serde_json::json!(null)),
            SerializationType::Json,
            definition.into(),
        );
        a.specific_hash = Some(specific.into());
        a
    }

    #[test]
    fn dependency_hash_is_order_independent() {
        let a = artifact("a", "1");
        let b = artifact("b", "2");
        let forward = dependency_hash(&[a.clone(), b.clone()]);
        let backward = dependency_hash(&[b, a]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn empty_inputs_use_sentinel() {
        assert_eq!(dependency_hash(&[]), EMPTY_DEPENDENCY_HASH);
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let v = serde_json::json!({"b": 1, "a": 2});
        assert_eq!(canonical_json(&v).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn definition_hash_is_stable_across_calls() {
        let config = StageConfig::new(
            crate::value_objects::StageName::new("A").unwrap(),
            StageKind::Parameter {
                params: BTreeMap::new(),
            },
            vec![],
        );
        assert_eq!(definition_hash(&config).unwrap(), definition_hash(&config).unwrap());
    }
}
