// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Cross-component scenarios exercising the Arbiter, the two artifact
//! backends, and both executors together. The remote-executor round trip
//! is skipped unless `PIPELINE_TEST_REDIS_URL` points at a reachable
//! Redis instance.

use async_trait::async_trait;
use pipeline_core::infrastructure::backend::LocalArtifactBackend;
use pipeline_core::infrastructure::executor::{LocalExecutor, RemoteQueueExecutor};
use pipeline_core::infrastructure::runtime::Arbiter;
use pipeline_core::infrastructure::worker::WorkerServer;
use pipeline_domain::entities::{Item, StageConfig, StageKind};
use pipeline_domain::error::PipelineError;
use pipeline_domain::repositories::{ArtifactBackend, CallableArgs, Executor, ExecutorCallable, ExecutorCallableRegistry};
use pipeline_domain::aggregates::Pipeline;
use pipeline_domain::services::stage_registry::StageRegistry;
use pipeline_domain::value_objects::StageName;
use std::collections::BTreeMap;
use std::sync::Arc;

fn name(s: &str) -> StageName {
    StageName::new(s).unwrap()
}

fn local_backend(dir: &std::path::Path) -> Arc<dyn ArtifactBackend> {
    Arc::new(LocalArtifactBackend::new(dir).unwrap())
}

/// Scenario 1 — Linear caching: `A -> B`, run twice against the same
/// backend directory. The second run must serve `B`'s only artifact from
/// cache rather than re-executing the stage.
#[tokio::test]
async fn linear_pipeline_serves_second_run_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let configs = vec![
        StageConfig::new(
            name("A"),
            StageKind::Parameter {
                params: BTreeMap::from([("k".to_string(), serde_json::json!("v"))]),
            },
            vec![],
        ),
        StageConfig::new(name("B"), StageKind::Identity, vec![name("A")]),
    ];
    let backend = local_backend(dir.path());

    let first = Arbiter::new(
        Pipeline::new(configs.clone()).unwrap(),
        StageRegistry::new(ExecutorCallableRegistry::new()),
        Arc::new(LocalExecutor::new()) as Arc<dyn Executor>,
        backend.clone(),
        "run-1",
    )
    .run(None)
    .await
    .unwrap();
    assert_eq!(first.final_artifacts.len(), 1);
    assert!(!first.final_artifacts[0].loaded_from_cache);

    let second = Arbiter::new(
        Pipeline::new(configs).unwrap(),
        StageRegistry::new(ExecutorCallableRegistry::new()),
        Arc::new(LocalExecutor::new()) as Arc<dyn Executor>,
        backend,
        "run-2",
    )
    .run(None)
    .await
    .unwrap();
    assert_eq!(second.final_artifacts.len(), 1);
    assert!(second.final_artifacts[0].loaded_from_cache);
    assert_eq!(first.final_artifacts[0].item.payload, second.final_artifacts[0].item.payload);
}

/// Scenario 2 — Missing payload: a `LocalFile` stage pointed at a path
/// that doesn't exist surfaces `SourceMissing`, not a panic or a silently
/// empty artifact set.
#[tokio::test]
async fn local_file_stage_with_missing_source_fails_with_source_missing() {
    let dir = tempfile::tempdir().unwrap();
    let configs = vec![StageConfig::new(
        name("A"),
        StageKind::LocalFile {
            filepath: dir.path().join("does-not-exist.txt"),
        },
        vec![],
    )];
    let backend = local_backend(dir.path());
    let result = Arbiter::new(
        Pipeline::new(configs).unwrap(),
        StageRegistry::new(ExecutorCallableRegistry::new()),
        Arc::new(LocalExecutor::new()) as Arc<dyn Executor>,
        backend,
        "run-1",
    )
    .run(None)
    .await;
    assert!(matches!(result, Err(PipelineError::SourceMissing { .. })));
}

/// Scenario 3 — Grid-search fan-out: a `GridSearch` stage over two `lr`
/// values feeding an `Executor` stage that consumes untyped `Data` items
/// must run the downstream stage once per fan-out group, not once total.
#[tokio::test]
async fn grid_search_fans_downstream_executor_into_one_group_per_point() {
    struct Echo;

    #[async_trait]
    impl ExecutorCallable for Echo {
        async fn invoke(&self, args: CallableArgs) -> Result<Vec<Item>, PipelineError> {
            let pipeline_domain::repositories::ItemGroup::Flat(items) = args.get("G").unwrap() else {
                panic!("expected a flat group of untyped items from G");
            };
            Ok(items.clone())
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut params = BTreeMap::new();
    params.insert(
        "lr".to_string(),
        vec![serde_json::json!(0.1), serde_json::json!(0.2)],
    );
    let configs = vec![
        StageConfig::new(name("G"), StageKind::GridSearch { params }, vec![]),
        StageConfig::new(
            name("H"),
            StageKind::Executor {
                execute: "echo".to_string(),
                full_artifacts: false,
            },
            vec![name("G")],
        ),
    ];
    let backend = local_backend(dir.path());
    let mut callables = ExecutorCallableRegistry::new();
    callables.register("echo", Arc::new(Echo));

    let outcome = Arbiter::new(
        Pipeline::new(configs).unwrap(),
        StageRegistry::new(callables),
        Arc::new(LocalExecutor::new()) as Arc<dyn Executor>,
        backend,
        "run-1",
    )
    .run(None)
    .await
    .unwrap();

    // One artifact per grid point: H runs once per lr value, each time
    // against a singleton input group rather than both points at once.
    assert_eq!(outcome.final_artifacts.len(), 2);
}

/// Scenario 4 — Dependency-hash stability: two independently constructed
/// stage-run computations over the same inputs must agree on
/// `dependency_hash`, regardless of input ordering, so a second process
/// reusing the first's cache hits rather than recomputing.
#[tokio::test]
async fn dependency_hash_is_stable_across_independent_computations() {
    let config = StageConfig::new(name("A"), StageKind::Parameter { params: BTreeMap::new() }, vec![]);
    let a = pipeline_domain::entities::Artifact::new(
        &config,
        Item::new(serde_json::json!(1)),
        pipeline_domain::value_objects::SerializationType::Json,
        "def-a".into(),
    );
    let mut a = a;
    a.specific_hash = Some("hash-a".into());
    let b = {
        let mut b = pipeline_domain::entities::Artifact::new(
            &config,
            Item::new(serde_json::json!(2)),
            pipeline_domain::value_objects::SerializationType::Json,
            "def-b".into(),
        );
        b.specific_hash = Some("hash-b".into());
        b
    };

    let process_one = pipeline_domain::services::hashing::dependency_hash(&[a.clone(), b.clone()]);
    let process_two = pipeline_domain::services::hashing::dependency_hash(&[b, a]);
    assert_eq!(process_one, process_two);
}

/// Scenario 6 — Executor failure: a user callable that returns an error
/// surfaces as `WorkerFailure`, and the stage run never reaches
/// `Complete` — a retry sees `DoesNotExist`, not a poisoned cache entry.
#[tokio::test]
async fn failing_callable_never_logs_a_complete_stage_run() {
    struct AlwaysFails;

    #[async_trait]
    impl ExecutorCallable for AlwaysFails {
        async fn invoke(&self, _args: CallableArgs) -> Result<Vec<Item>, PipelineError> {
            Err(PipelineError::worker_failure("H", "callable raised"))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let configs = vec![StageConfig::new(
        name("H"),
        StageKind::Executor {
            execute: "boom".to_string(),
            full_artifacts: false,
        },
        vec![],
    )];
    let backend = local_backend(dir.path());
    let mut callables = ExecutorCallableRegistry::new();
    callables.register("boom", Arc::new(AlwaysFails));

    let result = Arbiter::new(
        Pipeline::new(configs.clone()).unwrap(),
        StageRegistry::new(callables),
        Arc::new(LocalExecutor::new()) as Arc<dyn Executor>,
        backend.clone(),
        "run-1",
    )
    .run(None)
    .await;
    assert!(matches!(result, Err(PipelineError::WorkerFailure { .. })));

    let h_config = configs.iter().find(|c| c.name == name("H")).unwrap();
    let status = backend
        .pipeline_stage_run_status(h_config, pipeline_domain::services::hashing::EMPTY_DEPENDENCY_HASH)
        .await
        .unwrap();
    assert!(matches!(status, pipeline_domain::entities::StageRunStatus::DoesNotExist));
}

/// Scenario 5 — Remote executor round trip: a `RemoteQueueExecutor`
/// submits a task, a `WorkerServer` drains it from the same Redis queues,
/// and the caller observes a `remotely_produced`, cache-logged artifact.
/// Skipped unless `PIPELINE_TEST_REDIS_URL` is set to a reachable Redis
/// instance.
#[tokio::test]
async fn remote_executor_round_trips_through_a_worker_server() {
    let Ok(redis_url) = std::env::var("PIPELINE_TEST_REDIS_URL") else {
        eprintln!("skipping: PIPELINE_TEST_REDIS_URL not set");
        return;
    };

    struct Echo;

    #[async_trait]
    impl ExecutorCallable for Echo {
        async fn invoke(&self, _args: CallableArgs) -> Result<Vec<Item>, PipelineError> {
            Ok(vec![Item::new(serde_json::json!("hello"))])
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let backend = local_backend(dir.path());
    let mut callables = ExecutorCallableRegistry::new();
    callables.register("echo", Arc::new(Echo));
    let registry = Arc::new(StageRegistry::new(callables));
    let task_queue = format!("pipeline:test:tasks:{}", ulid::Ulid::new());
    let result_prefix = format!("pipeline:test:results:{}", ulid::Ulid::new());

    let server = WorkerServer::new(&redis_url, task_queue.clone(), result_prefix.clone(), registry.clone(), backend.clone())
        .await
        .unwrap();
    let shutdown = pipeline_bootstrap::shutdown::ShutdownCoordinator::default();
    let server_token = shutdown.token();
    let server_handle = tokio::spawn(async move { server.run(server_token).await });

    let executor = RemoteQueueExecutor::new(&redis_url, task_queue, result_prefix, backend.clone()).await.unwrap();
    let config = StageConfig::new(
        name("A"),
        StageKind::Executor {
            execute: "echo".to_string(),
            full_artifacts: false,
        },
        vec![],
    );
    let behavior = registry.behavior_for(&config.kind);
    let artifacts = executor.run_stage(behavior, &config, vec![], "run-1").await.unwrap();

    assert_eq!(artifacts.len(), 1);
    assert!(artifacts[0].remotely_produced);
    assert!(artifacts[0].loaded_from_cache);

    shutdown.initiate_shutdown();
    let _ = server_handle.await;
}
