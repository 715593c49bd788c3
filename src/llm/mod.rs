//! LLM integration for survey-forge.
//!
//! Persona and questionnaire synthesis only depend on the [`LlmProvider`]
//! trait: "given a prompt, return generated text". [`ChatClient`] talks to
//! any OpenAI-compatible chat completion endpoint; tests substitute scripted
//! providers.
//!
//! ```ignore
//! use survey_forge::llm::{complete, ChatClient, GenerationRequest, Message};
//!
//! let client = ChatClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("你好")]).with_temperature(0.3);
//! let text = complete(&client, request, Duration::from_secs(120)).await?;
//! ```

pub mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{
    complete, ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message,
    Usage, DEFAULT_API_BASE, DEFAULT_MODEL,
};
