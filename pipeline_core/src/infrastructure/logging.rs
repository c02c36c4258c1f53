// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Structured Logging
//!
//! Thin wrapper over `tracing-subscriber`. Every stage execution, backend
//! call, and scheduling transition is logged through `tracing` spans so a
//! single worker process's log stream can be correlated by
//! `pipeline_run_id` without a separate tracing backend.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global subscriber filtered by `level` (overridable via
/// `RUST_LOG`). Safe to call once per process; a second call is a no-op.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
