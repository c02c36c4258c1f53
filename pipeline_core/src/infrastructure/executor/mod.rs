// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Executors
//!
//! [`local::LocalExecutor`] runs a stage's behavior in-process.
//! [`remote::RemoteQueueExecutor`] hands a stage off to a worker process
//! over a Redis task queue, falling back to local execution for stages
//! whose kind is marked local-only.

pub mod local;
pub mod remote;

pub use local::LocalExecutor;
pub use remote::{RemoteQueueExecutor, TaskEnvelope, TaskResult};
