// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shows the library call a polished CLI would otherwise wrap: build a
//! small stage graph in memory, register one `Executor` callable, and
//! drive it to completion with an [`Arbiter`] against a local-disk
//! artifact backend.
//!
//! ```text
//! cargo run --example run_pipeline
//! ```

use async_trait::async_trait;
use pipeline_core::infrastructure::backend::LocalArtifactBackend;
use pipeline_core::infrastructure::executor::LocalExecutor;
use pipeline_core::infrastructure::runtime::Arbiter;
use pipeline_domain::aggregates::Pipeline;
use pipeline_domain::entities::{Item, StageConfig, StageKind};
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::{CallableArgs, Executor, ExecutorCallable, ExecutorCallableRegistry, ItemGroup};
use pipeline_domain::services::stage_registry::StageRegistry;
use pipeline_domain::value_objects::StageName;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Doubles every `n` value `raw_numbers` feeds it.
struct Doubler;

#[async_trait]
impl ExecutorCallable for Doubler {
    async fn invoke(&self, args: CallableArgs) -> Result<Vec<Item>, PipelineError> {
        let Some(ItemGroup::Flat(items)) = args.get("raw_numbers") else {
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .filter_map(|item| item.payload.as_ref()?.get("n")?.as_i64())
            .map(|n| Item::new(serde_json::json!(n * 2)))
            .collect())
    }
}

fn stage(name: &str) -> StageName {
    StageName::new(name).unwrap()
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    pipeline_core::infrastructure::logging::init("info");

    let mut params = BTreeMap::new();
    params.insert("n".to_string(), vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]);

    let configs = vec![
        StageConfig::new(stage("raw_numbers"), StageKind::GridSearch { params }, vec![]),
        StageConfig::new(
            stage("doubled"),
            StageKind::Executor {
                execute: "doubler".to_string(),
                full_artifacts: false,
            },
            vec![stage("raw_numbers")],
        ),
    ];

    let mut callables = ExecutorCallableRegistry::new();
    callables.register("doubler", Arc::new(Doubler));

    let workdir = tempfile::tempdir().expect("create demo artifact directory");
    let backend = Arc::new(LocalArtifactBackend::new(workdir.path())?);
    let arbiter = Arbiter::new(
        Pipeline::new(configs)?,
        StageRegistry::new(callables),
        Arc::new(LocalExecutor::new()) as Arc<dyn Executor>,
        backend,
        "demo-run",
    );

    let outcome = arbiter.run(None).await?;
    for artifact in &outcome.final_artifacts {
        println!("{} -> {:?}", artifact.pipeline_stage, artifact.item.payload);
    }
    Ok(())
}
