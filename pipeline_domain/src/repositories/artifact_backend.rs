// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact Backend Port
//!
//! The two-layer cache contract shared by the local-disk and remote
//! implementations. See the local and remote backends in the
//! infrastructure crate for the concrete storage layouts.

use crate::entities::{Artifact, StageConfig, StageRunStatus};
use crate::error::PipelineError;
use async_trait::async_trait;

/// Retention hook reserved for future use. Both shipped backends return
/// `Ok(0)` today; nothing in this crate calls `prune` yet.
#[derive(Debug, Clone, Default)]
pub struct PrunePolicy {
    pub older_than_unix_seconds: Option<f64>,
}

#[async_trait]
pub trait ArtifactBackend: Send + Sync {
    /// Persists the artifact's payload and appends it to its stage-run
    /// record. Fails with `MissingPayload` if `artifact.item.payload` is
    /// `None`. Idempotent: saving the same UID twice is a no-op the second
    /// time.
    async fn save_artifact(&self, artifact: &Artifact) -> Result<(), PipelineError>;

    /// Hydrates a fully-formed artifact (metadata + payload) given an
    /// artifact whose identity fields (`specific_hash`, `dependency_hash`,
    /// `definition_hash`, stage, item type) are already populated. Returns
    /// `Ok(None)` if no such artifact has been saved.
    async fn load_artifact(&self, artifact: &Artifact) -> Result<Option<Artifact>, PipelineError>;

    /// Metadata-only lookup, used by the scheduler to decide whether a
    /// fresh run is needed without paying for a payload fetch.
    async fn find_cached_artifact(&self, artifact: &Artifact) -> Result<Option<Artifact>, PipelineError>;

    /// Returns every artifact recorded against a given stage run key.
    async fn find_pipeline_stage_run_artifacts(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<Vec<Artifact>, PipelineError>;

    async fn pipeline_stage_run_status(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<StageRunStatus, PipelineError>;

    /// Atomically transitions a stage run from `InProgress` to `Complete`.
    /// Calling this on an already-complete run is a no-op.
    async fn log_pipeline_stage_run_complete(
        &self,
        config: &StageConfig,
        dependency_hash: &str,
    ) -> Result<(), PipelineError>;

    /// Reserved retention hook; default backends are no-ops.
    async fn prune(&self, _policy: PrunePolicy) -> Result<u64, PipelineError> {
        Ok(0)
    }
}
