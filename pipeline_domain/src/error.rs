// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Error Taxonomy
//!
//! A single error type shared by the scheduler, the artifact backends, and
//! the executors. Every variant is categorized so infrastructure code
//! (logging, metrics) can react to a class of failure without matching on
//! every individual variant.

use std::path::PathBuf;

/// The error type returned by every fallible domain and infrastructure
/// operation in this crate.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    #[error("stage '{stage}' input source missing: {path}")]
    SourceMissing { stage: String, path: String },

    #[error("artifact from stage '{stage}' has no payload to save")]
    MissingPayload { stage: String },

    #[error("worker could not rehydrate payload for input artifact {uid} from stage '{stage}': backend has no payload stored under that uid")]
    PayloadMissing { stage: String, uid: String },

    #[error("backend corruption: artifact {uid} has metadata but no payload")]
    Corruption { uid: String },

    #[error("lost a compare-and-swap race updating stage run record after {attempts} attempts")]
    RaceLost { attempts: u32 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("worker failed executing stage '{stage}': {reason}")]
    WorkerFailure { stage: String, reason: String },

    #[error("unknown stage kind '{0}'")]
    UnknownStageKind(String),

    #[error("duplicate stage name '{0}'")]
    DuplicateStageName(String),

    #[error("cyclic stage dependency detected involving '{0}'")]
    CyclicDependency(String),

    #[error("unknown serialization type '{0}'")]
    UnknownSerializationType(String),

    #[error("no executor callable registered under key '{0}'")]
    UnregisteredCallable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn source_missing<S: Into<String>>(stage: S, path: impl Into<PathBuf>) -> Self {
        Self::SourceMissing {
            stage: stage.into(),
            path: path.into().display().to_string(),
        }
    }

    pub fn missing_payload<S: Into<String>>(stage: S) -> Self {
        Self::MissingPayload { stage: stage.into() }
    }

    pub fn payload_missing<S: Into<String>, U: Into<String>>(stage: S, uid: U) -> Self {
        Self::PayloadMissing {
            stage: stage.into(),
            uid: uid.into(),
        }
    }

    pub fn worker_failure<S: Into<String>, R: Into<String>>(stage: S, reason: R) -> Self {
        Self::WorkerFailure {
            stage: stage.into(),
            reason: reason.into(),
        }
    }

    /// Whether a caller may reasonably retry the operation that produced
    /// this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RaceLost { .. } | Self::Cancelled)
    }

    /// Coarse failure category, used by logging and metrics instead of
    /// matching on every variant.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "config",
            Self::SourceMissing { .. } => "source_missing",
            Self::MissingPayload { .. } => "missing_payload",
            Self::PayloadMissing { .. } => "payload_missing",
            Self::Corruption { .. } => "corruption",
            Self::RaceLost { .. } => "race_lost",
            Self::Cancelled => "cancelled",
            Self::WorkerFailure { .. } => "worker_failure",
            Self::UnknownStageKind(_) => "config",
            Self::DuplicateStageName(_) => "config",
            Self::CyclicDependency(_) => "config",
            Self::UnknownSerializationType(_) => "config",
            Self::UnregisteredCallable(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
