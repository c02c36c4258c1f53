// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Name
//!
//! A validated identifier for a stage within a pipeline. Stage names are
//! used as map keys, as queue message attributes, and as path components in
//! the local backend, so they are restricted to a conservative character
//! set up front rather than escaped at every use site.

use crate::error::PipelineError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

static STAGE_NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

fn pattern() -> &'static Regex {
    STAGE_NAME_PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_\-]*$").expect("valid regex"))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    pub fn new(name: impl Into<String>) -> Result<Self, PipelineError> {
        let name = name.into();
        if !pattern().is_match(&name) {
            return Err(PipelineError::config_error(format!(
                "stage name '{name}' must start with a letter and contain only letters, digits, '_' or '-'"
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for StageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conventional_names() {
        assert!(StageName::new("Pics").is_ok());
        assert!(StageName::new("grid_search-1").is_ok());
    }

    #[test]
    fn rejects_names_starting_with_digit() {
        assert!(StageName::new("1Pics").is_err());
    }

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(StageName::new("").is_err());
        assert!(StageName::new("has space").is_err());
    }
}
