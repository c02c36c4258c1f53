// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command-Line Interface
//!
//! A thin CLI surface, deliberately narrow: `run <pipeline.json>` drives a
//! pipeline to completion in-process; `serve` starts a worker server
//! attached to the remote task/result queues. Everything else — pipeline
//! authoring, cloud provisioning, a progress TUI — is a collaborator's
//! concern, not this crate's.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pipeline-worker", version, about = "Content-addressed pipeline scheduler")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a layered TOML config file (overridden by PIPELINE__* env vars).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline defined by a JSON config file to completion.
    Run {
        /// Path to the pipeline's JSON stage graph.
        pipeline: PathBuf,

        /// Stop the arbiter after this many seconds even if stages remain.
        #[arg(long)]
        close_after: Option<u64>,
    },
    /// Start a worker server consuming the remote task queue.
    Serve {
        /// Stop accepting new tasks after this many seconds.
        #[arg(long)]
        close_after: Option<u64>,
    },
}

/// `Commands` after whatever light validation a thin CLI needs to do
/// before handing off to the scheduler core — mirrors `Commands` field for
/// field; kept distinct so callers pattern-match on a type that can grow
/// validated fields (canonicalized paths, etc.) without touching the clap
/// surface.
#[derive(Debug, Clone)]
pub enum ParsedCommand {
    Run { pipeline: PathBuf, close_after: Option<u64> },
    Serve { close_after: Option<u64> },
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("pipeline config not found: {0}")]
    PipelineNotFound(PathBuf),
}

/// Parses `std::env::args()` and validates the result is usable without
/// touching the filesystem beyond an existence check on `run`'s pipeline
/// path.
pub fn parse_cli() -> Result<(ParsedCommand, Cli), ParseError> {
    let cli = Cli::parse();
    let parsed = match &cli.command {
        Commands::Run { pipeline, close_after } => {
            if !pipeline.is_file() {
                return Err(ParseError::PipelineNotFound(pipeline.clone()));
            }
            ParsedCommand::Run {
                pipeline: pipeline.clone(),
                close_after: *close_after,
            }
        }
        Commands::Serve { close_after } => ParsedCommand::Serve { close_after: *close_after },
    };
    Ok((parsed, cli))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_requires_an_existing_pipeline_file() {
        let cli = Cli {
            command: Commands::Run {
                pipeline: PathBuf::from("/no/such/pipeline.json"),
                close_after: None,
            },
            config: None,
            verbose: false,
        };
        let Commands::Run { pipeline, close_after } = cli.command else {
            unreachable!()
        };
        assert!(!pipeline.is_file());
        assert!(close_after.is_none());
    }
}
