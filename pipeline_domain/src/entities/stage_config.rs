// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Config
//!
//! The immutable description of one node in a pipeline graph. `StageKind`
//! is a closed set; adding a new kind of stage means adding a variant here
//! and a matching arm in every place that pattern-matches on it, rather
//! than opening the set to arbitrary dynamically loaded classes.

use crate::value_objects::StageName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StageKind {
    LocalFile { filepath: PathBuf },
    LocalDirectory { filepath: PathBuf, binary_mode: bool },
    Parameter { params: BTreeMap<String, Value> },
    GridSearch { params: BTreeMap<String, Vec<Value>> },
    Identity,
    Executor {
        /// Key into the embedding application's `ExecutorCallableRegistry`.
        execute: String,
        #[serde(default)]
        full_artifacts: bool,
    },
}

impl StageKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::LocalFile { .. } => "LocalFile",
            Self::LocalDirectory { .. } => "LocalDirectory",
            Self::Parameter { .. } => "Parameter",
            Self::GridSearch { .. } => "GridSearch",
            Self::Identity => "Identity",
            Self::Executor { .. } => "Executor",
        }
    }

    /// Stages whose inputs cannot be meaningfully handed to a remote
    /// worker (they read local process state or the local filesystem)
    /// always execute in the submitting process, regardless of which
    /// Executor variant is configured.
    pub fn is_local_only(&self) -> bool {
        matches!(
            self,
            Self::LocalFile { .. } | Self::LocalDirectory { .. } | Self::Parameter { .. } | Self::GridSearch { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: StageName,
    pub kind: StageKind,
    #[serde(default)]
    pub inputs: Vec<StageName>,
}

impl StageConfig {
    pub fn new(name: StageName, kind: StageKind, inputs: Vec<StageName>) -> Self {
        Self { name, kind, inputs }
    }

    pub fn has_inputs(&self) -> bool {
        !self.inputs.is_empty()
    }
}
