//! Command-line interface for survey-forge.
//!
//! Provides the full augmentation run, a stand-alone jitter pass over a
//! generated file, and a schema inspection command.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
