// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Infrastructure ports: async traits the domain depends on but does not
//! implement. Concrete implementations (local disk, remote object store,
//! local/remote executors) live in the infrastructure crate.

pub mod artifact_backend;
pub mod callable;
pub mod executor;
pub mod stage;

pub use artifact_backend::ArtifactBackend;
pub use callable::{CallableArgs, ExecutorCallable, ExecutorCallableRegistry, ItemGroup};
pub use executor::Executor;
pub use stage::StageBehavior;
