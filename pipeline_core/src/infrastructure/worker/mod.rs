// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Worker
//!
//! The long-running process that consumes [`RemoteQueueExecutor`](crate::infrastructure::executor::remote::RemoteQueueExecutor)'s
//! task queue. See [`server::WorkerServer`].

pub mod server;

pub use server::WorkerServer;
