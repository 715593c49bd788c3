//! Error types for survey-forge operations.
//!
//! Defines error types for every subsystem of the pipeline:
//! - Question schema loading
//! - Clustering of respondents
//! - LLM API interactions
//! - Persona and questionnaire synthesis
//! - Parsing of individual model responses
//! - Output store persistence

use thiserror::Error;

/// Errors that can occur while loading the question schema.
///
/// These are fatal: a run aborts before any generation work begins.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Question '{label}' has no leading question number")]
    MissingNumber { label: String },

    #[error("Question number {0} is defined more than once")]
    DuplicateNumber(u32),

    #[error("Question schema contains no questions")]
    Empty,

    #[error("Schema defines {schema} questions but the survey data has {data} columns")]
    ColumnCountMismatch { schema: usize, data: usize },

    #[error("Malformed survey data: {0}")]
    MalformedData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during clustering.
#[derive(Debug, Error)]
pub enum ClusteringError {
    #[error("Cannot cluster an empty feature matrix")]
    Empty,

    #[error("Invalid cluster count {k} for {n} respondents: must satisfy 1 <= k <= n")]
    InvalidK { k: usize, n: usize },
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: FORGE_API_BASE is empty")]
    MissingApiBase,

    #[error("HTTP client could not be built: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors raised by the output store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Malformed stored row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("No records to write")]
    NoRecords,

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Reasons a single generation response is rejected.
///
/// Recoverable: the synthesizer logs the failure and retries within its
/// attempt budget. Never counts toward a cluster's target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("Response contains no JSON object")]
    NoJson,

    #[error("Response JSON is invalid: {0}")]
    InvalidJson(String),

    #[error("Response has no answers list")]
    MissingAnswers,

    #[error("No response key carries a question number")]
    NoQuestionNumbers,
}

/// Errors that can occur during persona or questionnaire synthesis.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Generation exhausted for cluster {cluster_id} after {attempts} attempts: {last_error}")]
    GenerationExhausted {
        cluster_id: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Prompt template rendering error: {0}")]
    Template(#[from] tera::Error),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
