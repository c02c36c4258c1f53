// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Serialization Type
//!
//! How an [`Item`](crate::entities::Item) payload is encoded when hashed
//! and persisted. `Json` and `String` payloads are materialized in memory;
//! `Bytestream` and `Stringstream` payloads are read through a
//! [`ContentStream`](crate::services::ContentStream) and are never fully
//! buffered by the hashing algebra.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerializationType {
    Json,
    String,
    Bytestream,
    Stringstream,
}

impl SerializationType {
    pub fn is_streaming(self) -> bool {
        matches!(self, Self::Bytestream | Self::Stringstream)
    }
}

impl fmt::Display for SerializationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::String => "string",
            Self::Bytestream => "bytestream",
            Self::Stringstream => "stringstream",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SerializationType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "string" => Ok(Self::String),
            "bytestream" => Ok(Self::Bytestream),
            "stringstream" => Ok(Self::Stringstream),
            other => Err(PipelineError::UnknownSerializationType(other.to_string())),
        }
    }
}
