// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact
//!
//! The serializable wrapper around one [`Item`], carrying enough
//! provenance (producing stage, definition hash, dependency hash, specific
//! hash) to compute its own [`ArtifactUid`] and to be cached, found, and
//! re-hydrated by an [`ArtifactBackend`](crate::repositories::ArtifactBackend).

use crate::entities::{Item, StageConfig};
use crate::services::hashing::{build_uid, UNSET_DEPENDENCY_HASH};
use crate::value_objects::{ArtifactUid, FanoutParameters, SerializationType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub pipeline_stage: String,
    pub definition_hash: String,
    pub dependency_hash: String,
    pub specific_hash: Option<String>,
    pub serialization_type: SerializationType,
    pub creation_time: Option<f64>,
    pub fanout_parameters: FanoutParameters,
    pub item: Item,
    /// Set by the remote executor once it hydrates a completion produced
    /// by a worker, so the scheduler knows not to re-save it.
    #[serde(default)]
    pub remotely_produced: bool,
    /// Set by the scheduler when an artifact was served from the backend
    /// rather than freshly generated.
    #[serde(default)]
    pub loaded_from_cache: bool,
}

impl Artifact {
    pub fn new(
        config: &StageConfig,
        item: Item,
        serialization_type: SerializationType,
        definition_hash: String,
    ) -> Self {
        Self {
            pipeline_stage: config.name.as_str().to_string(),
            definition_hash,
            dependency_hash: UNSET_DEPENDENCY_HASH.to_string(),
            specific_hash: None,
            serialization_type,
            creation_time: None,
            fanout_parameters: FanoutParameters::new(),
            item,
            remotely_produced: false,
            loaded_from_cache: false,
        }
    }

    pub fn uid(&self) -> ArtifactUid {
        build_uid(
            &self.definition_hash,
            self.specific_hash.as_deref().unwrap_or(""),
            &self.dependency_hash,
        )
    }

    /// Fills in `creation_time` and `dependency_hash` the first time an
    /// artifact is about to be saved, mirroring the two fields the source
    /// system defers until a run's dependency set is known.
    pub fn ensure_run_metadata(&mut self, creation_time: f64, dependency_hash: &str) {
        if self.creation_time.is_none() {
            self.creation_time = Some(creation_time);
        }
        if self.dependency_hash == UNSET_DEPENDENCY_HASH {
            self.dependency_hash = dependency_hash.to_string();
        }
    }
}
