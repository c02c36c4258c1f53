// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Item
//!
//! The user-facing payload unit produced by a stage. An [`Artifact`](crate::entities::Artifact)
//! is the wrapper that gives an `Item` identity, provenance, and a home in
//! the backend; the `Item` itself carries only what the stage callback
//! actually cares about.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Present once the artifact's payload has been loaded; absent when
    /// only metadata was fetched from the backend.
    pub payload: Option<Value>,
    pub meta: BTreeMap<String, Value>,
    pub tags: Vec<String>,
    pub r#type: Option<String>,
}

impl Item {
    pub fn new(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            meta: BTreeMap::new(),
            tags: Vec::new(),
            r#type: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            payload: None,
            meta: BTreeMap::new(),
            tags: Vec::new(),
            r#type: None,
        }
    }

    pub fn with_type(mut self, item_type: impl Into<String>) -> Self {
        self.r#type = Some(item_type.into());
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}
