// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Artifact UID
//!
//! The canonical identity of an artifact: the concatenation of its
//! producing stage's `definition_hash`, the payload's `specific_hash`, and
//! the `dependency_hash` of the artifacts that fed the run. Two artifacts
//! with equal UIDs are, by construction, the same bytes.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactUid(String);

impl ArtifactUid {
    /// Builds a UID from its three hash components, matching the source
    /// system's `definition_specific_dependency` ordering.
    pub fn new(definition_hash: &str, specific_hash: &str, dependency_hash: &str) -> Self {
        Self(format!("{definition_hash}_{specific_hash}_{dependency_hash}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the UID back into its `(definition, specific, dependency)`
    /// hash components.
    pub fn parts(&self) -> Result<(&str, &str, &str), PipelineError> {
        let mut parts = self.0.splitn(3, '_');
        let definition = parts.next();
        let specific = parts.next();
        let dependency = parts.next();
        match (definition, specific, dependency) {
            (Some(d), Some(s), Some(dep)) => Ok((d, s, dep)),
            _ => Err(PipelineError::Internal(format!(
                "malformed artifact uid '{}'",
                self.0
            ))),
        }
    }
}

impl fmt::Display for ArtifactUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ArtifactUid {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for ArtifactUid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_parts() {
        let uid = ArtifactUid::new("def", "spec", "dep");
        assert_eq!(uid.as_str(), "def_spec_dep");
        assert_eq!(uid.parts().unwrap(), ("def", "spec", "dep"));
    }
}
