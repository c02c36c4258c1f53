// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Core
//!
//! The infrastructure crate for the content-addressed pipeline scheduler:
//! concrete [`ArtifactBackend`](pipeline_domain::repositories::ArtifactBackend)
//! and [`Executor`](pipeline_domain::repositories::Executor) implementations,
//! the [`infrastructure::runtime::Arbiter`] that drives a stage graph to
//! completion, and the [`infrastructure::worker::WorkerServer`] that
//! consumes the remote task queue.
//!
//! ## Layout
//!
//! - [`infrastructure::backend`] — local-disk and Redis-backed artifact
//!   stores.
//! - [`infrastructure::executor`] — in-process and remote-queue stage
//!   execution.
//! - [`infrastructure::runtime`] — the Arbiter, the resolver's
//!   `generate_stage`/`run_stage` scheduling logic, and the Input Future
//!   barrier.
//! - [`infrastructure::worker`] — the long-running remote task consumer.
//! - [`infrastructure::config`] — layered runtime configuration.
//! - [`infrastructure::logging`], [`infrastructure::metrics`] — ambient
//!   observability.
//!
//! Domain types (`Pipeline`, `StageConfig`, `Artifact`, the hashing
//! algebra) live in the `pipeline-domain` crate; this crate has no opinion
//! about pipeline graph semantics beyond driving them to completion.

pub mod infrastructure;

pub use pipeline_domain::{PipelineError, PipelineResult};
