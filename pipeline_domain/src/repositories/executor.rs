// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Executor Port
//!
//! Runs one stage against one group of input artifacts and returns the
//! freshly generated artifacts, unsaved. The local variant invokes
//! `StageBehavior::yield_artifacts` in-process; the remote variant
//! publishes the work to a durable task queue and awaits a worker's
//! completion (see the infrastructure crate).

use crate::entities::{Artifact, StageConfig};
use crate::error::PipelineError;
use crate::repositories::StageBehavior;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Executor: Send + Sync {
    /// Runs `stage` against `inputs`, returning every artifact it
    /// produced. `pipeline_run_id` is opaque to the executor; it is
    /// forwarded to observers and to the remote task envelope.
    async fn run_stage(
        &self,
        stage: Arc<dyn StageBehavior>,
        config: &StageConfig,
        inputs: Vec<Artifact>,
        pipeline_run_id: &str,
    ) -> Result<Vec<Artifact>, PipelineError>;
}
