//! LLM-driven synthesis: personas per cluster, then questionnaires per
//! persona.
//!
//! # Architecture
//!
//! - [`persona`] - dimension choice, one persona per cluster, exclusions
//! - [`questionnaire`] - bounded-retry questionnaire generation and standardization
//! - [`allocation`] - proportional per-cluster targets
//! - [`retry`] - backoff policy shared by both synthesizers
//! - [`prompts`] - Tera prompt templates

pub mod allocation;
pub mod persona;
pub mod prompts;
pub mod questionnaire;
pub mod retry;

pub use allocation::allocate_targets;
pub use persona::{
    apply_exclusions, cluster_profile, dimension_schema, Exclusion, Persona, PersonaSynthesizer,
    FALLBACK_DIMENSIONS,
};
pub use prompts::SurveyPrompt;
pub use questionnaire::{
    parse_answer_pairs, standardize_response, QuestionnaireSynthesizer, Standardized,
    SynthesisReport,
};
pub use retry::RetryPolicy;
