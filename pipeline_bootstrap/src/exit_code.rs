// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Exit Codes
//!
//! Maps a `PipelineError`'s category to a BSD sysexits.h-style exit code so
//! shell scripts driving `pipeline-worker` can branch on failure class
//! instead of parsing stderr.

use pipeline_domain::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    Ok = 0,
    ConfigError = 78,    // EX_CONFIG
    SourceMissing = 66,  // EX_NOINPUT
    WorkerFailure = 70,  // EX_SOFTWARE
    Corruption = 65,     // EX_DATAERR
    Transient = 75,      // EX_TEMPFAIL
    Cancelled = 130,     // 128 + SIGINT
    Unknown = 1,
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

pub fn map_error_to_exit_code(error: &PipelineError) -> ExitCode {
    match error.category() {
        "config" => ExitCode::ConfigError,
        "source_missing" => ExitCode::SourceMissing,
        "worker_failure" | "missing_payload" | "payload_missing" | "internal" => ExitCode::WorkerFailure,
        "corruption" | "serialization" => ExitCode::Corruption,
        "race_lost" | "io" => ExitCode::Transient,
        "cancelled" => ExitCode::Cancelled,
        _ => ExitCode::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_ex_config() {
        let err = PipelineError::config_error("bad stage");
        assert_eq!(map_error_to_exit_code(&err), ExitCode::ConfigError);
    }

    #[test]
    fn cancellation_maps_to_sigint_convention() {
        assert_eq!(map_error_to_exit_code(&PipelineError::Cancelled), ExitCode::Cancelled);
    }

    #[test]
    fn internal_errors_map_to_ex_software_like_worker_failure() {
        let err = PipelineError::Internal("redis blpop task queue failed after 5 attempts: connection refused".to_string());
        assert_eq!(map_error_to_exit_code(&err), ExitCode::WorkerFailure);
    }

    #[test]
    fn unparsable_artifact_metadata_maps_to_corruption() {
        let err: PipelineError = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err().into();
        assert_eq!(map_error_to_exit_code(&err), ExitCode::Corruption);
    }
}
