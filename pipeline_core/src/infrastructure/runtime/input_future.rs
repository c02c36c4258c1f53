// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Input Future
//!
//! The cooperative barrier a stage with inputs blocks on while its direct
//! predecessors resolve. The resolver publishes a [`PendingInputFuture`] on
//! the Arbiter's scheduling channel and receives back an
//! [`InputFutureHandle`] to await; the Arbiter's queue listener is the only
//! thing that ever attaches sub-awaitables and resolves the responder.

use pipeline_domain::entities::Artifact;
use pipeline_domain::error::PipelineError;
use pipeline_domain::value_objects::StageName;
use tokio::sync::oneshot;

/// One pending resolution request: "give me the artifacts produced by each
/// of these stages". `input_sources` order is preserved in the result.
pub struct PendingInputFuture {
    pub stage_name: StageName,
    pub input_sources: Vec<StageName>,
    responder: oneshot::Sender<InputFutureOutcome>,
}

type InputFutureOutcome = Result<Vec<Vec<Artifact>>, PipelineError>;

impl PendingInputFuture {
    pub fn new(stage_name: StageName, input_sources: Vec<StageName>) -> (Self, InputFutureHandle) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                stage_name,
                input_sources,
                responder: tx,
            },
            InputFutureHandle { receiver: rx },
        )
    }

    /// Attaches the resolved per-source artifact groups, waking the waiting
    /// resolver task. Called exactly once by the queue listener; a dropped
    /// receiver (the waiter was cancelled) is not an error.
    pub fn resolve(self, outcome: InputFutureOutcome) {
        let _ = self.responder.send(outcome);
    }
}

/// The resolver's side of a [`PendingInputFuture`]: awaited once all of the
/// future's associated sub-awaitables have been attached and joined.
pub struct InputFutureHandle {
    receiver: oneshot::Receiver<InputFutureOutcome>,
}

impl InputFutureHandle {
    /// Awaits the production of artifacts from every associated source,
    /// flattening the per-source groups into a single collection in source
    /// order. A dropped responder (Arbiter shutdown before resolution)
    /// surfaces as [`PipelineError::Cancelled`].
    pub async fn await_artifacts(self) -> Result<Vec<Artifact>, PipelineError> {
        match self.receiver.await {
            Ok(Ok(groups)) => Ok(groups.into_iter().flatten().collect()),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(PipelineError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flattens_per_source_groups_in_order() {
        let (pending, handle) = PendingInputFuture::new(StageName::new("B").unwrap(), vec![StageName::new("A").unwrap()]);
        let config = pipeline_domain::entities::StageConfig::new(
            StageName::new("A").unwrap(),
            pipeline_domain::entities::StageKind::Identity,
            vec![],
        );
        let a1 = Artifact::new(
            &config,
            pipeline_domain::entities::Item::new(serde_json::json!(1)),
            pipeline_domain::value_objects::SerializationType::Json,
            "d".into(),
        );
        let a2 = Artifact::new(
            &config,
            pipeline_domain::entities::Item::new(serde_json::json!(2)),
            pipeline_domain::value_objects::SerializationType::Json,
            "d".into(),
        );
        pending.resolve(Ok(vec![vec![a1.clone(), a2.clone()]]));
        let artifacts = handle.await_artifacts().await.unwrap();
        assert_eq!(artifacts.len(), 2);
    }

    #[tokio::test]
    async fn dropped_future_surfaces_as_cancelled() {
        let (pending, handle) = PendingInputFuture::new(StageName::new("B").unwrap(), vec![]);
        drop(pending);
        let err = handle.await_artifacts().await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
    }
}
