// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Runtime Configuration
//!
//! Layered configuration for the worker process: defaults, an optional
//! TOML file, then environment variables prefixed `PIPELINE_`, in that
//! precedence order, via the `config` crate.
//!
//! ```toml
//! # pipeline.toml
//! pipeline_file = "pipelines/demo.json"
//! close_after_seconds = 300
//!
//! [backend]
//! kind = "local"
//! root = "./artifacts"
//!
//! [executor]
//! kind = "local"
//! worker_threads = 8
//!
//! [observability]
//! log_level = "info"
//! metrics_enabled = true
//! ```

use pipeline_domain::error::PipelineError;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    #[serde(default = "default_backend_root")]
    pub root: String,
    pub redis_url: Option<String>,
}

fn default_backend_kind() -> BackendKind {
    BackendKind::Local
}

fn default_backend_root() -> String {
    "./artifacts".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_executor_kind")]
    pub kind: ExecutorKind,
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    pub redis_url: Option<String>,
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
    #[serde(default = "default_result_queue_prefix")]
    pub result_queue_prefix: String,
}

fn default_executor_kind() -> ExecutorKind {
    ExecutorKind::Local
}

fn default_worker_threads() -> usize {
    num_cpus()
}

fn default_task_queue() -> String {
    "pipeline:tasks".to_string()
}

fn default_result_queue_prefix() -> String {
    "pipeline:results:".to_string()
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    pub pipeline_file: String,
    pub close_after_seconds: Option<u64>,
    #[serde(default = "default_backend")]
    pub backend: BackendConfig,
    #[serde(default = "default_executor")]
    pub executor: ExecutorConfig,
    #[serde(default = "default_observability")]
    pub observability: ObservabilityConfig,
}

fn default_backend() -> BackendConfig {
    BackendConfig {
        kind: BackendKind::Local,
        root: default_backend_root(),
        redis_url: None,
    }
}

fn default_executor() -> ExecutorConfig {
    ExecutorConfig {
        kind: ExecutorKind::Local,
        worker_threads: default_worker_threads(),
        redis_url: None,
        task_queue: default_task_queue(),
        result_queue_prefix: default_result_queue_prefix(),
    }
}

fn default_observability() -> ObservabilityConfig {
    ObservabilityConfig {
        log_level: default_log_level(),
        metrics_enabled: default_metrics_enabled(),
        metrics_port: None,
    }
}

impl RuntimeConfig {
    /// Loads config from an optional file path, layered under environment
    /// variables prefixed `PIPELINE__` (double underscore separates nested
    /// keys, e.g. `PIPELINE__BACKEND__KIND=remote`).
    pub fn load(file_path: Option<&str>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("PIPELINE").separator("__"));
        let settings = builder
            .build()
            .map_err(|e| PipelineError::config_error(format!("failed to load configuration: {e}")))?;
        settings
            .try_deserialize()
            .map_err(|e| PipelineError::config_error(format!("invalid configuration: {e}")))
    }
}
