//! survey-forge: persona-conditioned augmentation of a university AIGC survey.
//!
//! This library clusters the original respondents, writes one persona per
//! cluster with a language model, synthesizes new questionnaires in each
//! persona's voice, enforces the questionnaire's skip logic, and perturbs the
//! synthesized set with a seeded jitter pass.

// Core modules
pub mod analysis;
pub mod cli;
pub mod clustering;
pub mod config;
pub mod error;
pub mod jitter;
pub mod llm;
pub mod pipeline;
pub mod schema;
pub mod store;
pub mod survey;
pub mod synthesis;
pub mod utils;

// Re-export commonly used error types
pub use error::{
    ClusteringError, LlmError, ParseFailure, SchemaError, StoreError, SynthesisError,
};

pub use config::{ConfigError, ForgeConfig, JitterProbabilities};
pub use jitter::JitterEngine;
pub use pipeline::{Pipeline, PipelineError, RunOutcome};
pub use schema::{Question, QuestionKind, QuestionSchema};
pub use survey::{RespondentRecord, SKIP};
