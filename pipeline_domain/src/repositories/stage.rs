// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Behavior Port
//!
//! The contract every built-in stage kind implements. Concrete behaviors
//! (the artifact providers for the leaf kinds, `Identity`, `Executor`) are
//! registered by [`crate::services::stage_registry::StageRegistry`].

use crate::entities::{Artifact, StageConfig};
use crate::error::PipelineError;
use crate::value_objects::StageName;
use async_trait::async_trait;
use std::collections::BTreeSet;

#[async_trait]
pub trait StageBehavior: Send + Sync {
    /// Validates that every input this stage declares resolves to a name
    /// already known in the pipeline being constructed.
    fn validate_prereqs(&self, config: &StageConfig, known_stages: &BTreeSet<StageName>) -> Result<(), PipelineError> {
        for input in &config.inputs {
            if !known_stages.contains(input) {
                return Err(PipelineError::config_error(format!(
                    "stage '{}' declares unknown input '{}'",
                    config.name, input
                )));
            }
        }
        Ok(())
    }

    /// Produces this stage's output artifacts given its (already grouped)
    /// input artifacts. Leaf kinds ignore `inputs`.
    async fn yield_artifacts(&self, config: &StageConfig, inputs: &[Artifact]) -> Result<Vec<Artifact>, PipelineError>;

    /// If true, a remote Executor must run this stage in-process rather
    /// than publishing it to the task queue.
    fn is_local_only(&self, config: &StageConfig) -> bool {
        config.kind.is_local_only()
    }
}
