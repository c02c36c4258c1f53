// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Executor Callable Registry
//!
//! The worker-side contract for `Executor` stages. The source system
//! dynamically imports a Python module by dotted path; this crate instead
//! looks a stage's `execute` key up in a table the embedding application
//! builds at startup, so user code ships as ordinary Rust compiled into
//! the worker binary.

use crate::entities::{Artifact, Item};
use crate::error::PipelineError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// How one predecessor stage's output is presented to an `Executor`
/// stage's callable, mirroring the three shapes the source system's
/// `yield_artifacts` assembles.
#[derive(Debug, Clone)]
pub enum ItemGroup {
    /// Items grouped by their `type` tag.
    Typed(HashMap<String, Vec<Item>>),
    /// The predecessor emitted only untyped items.
    Flat(Vec<Item>),
    /// `full_artifacts: true` was set on the consuming stage.
    Artifacts(Vec<Artifact>),
}

/// Keyword-style arguments passed to a registered callable: one entry per
/// predecessor stage name.
pub type CallableArgs = HashMap<String, ItemGroup>;

#[async_trait]
pub trait ExecutorCallable: Send + Sync {
    async fn invoke(&self, args: CallableArgs) -> Result<Vec<Item>, PipelineError>;
}

/// Maps an `Executor` stage's `execute` key to its registered callable.
#[derive(Clone, Default)]
pub struct ExecutorCallableRegistry {
    callables: HashMap<String, Arc<dyn ExecutorCallable>>,
}

impl ExecutorCallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, callable: Arc<dyn ExecutorCallable>) {
        self.callables.insert(key.into(), callable);
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn ExecutorCallable>, PipelineError> {
        self.callables
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::UnregisteredCallable(key.to_string()))
    }
}
