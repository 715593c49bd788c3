//! Questionnaire synthesis.
//!
//! For each persona the model is asked to fill the whole questionnaire until
//! the persona's target is met. Every accepted response is re-keyed onto the
//! schema's column order, passed through skip logic and answer
//! normalization, and appended to the output sink before the next call.
//!
//! A response is rejected (and does not count) when it contains no JSON
//! object, has no `answers` list, or none of its keys carries a question
//! number. Rejections and generation failures share one bounded attempt
//! budget that resets after every accepted record.

use std::sync::Arc;

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use serde_json::Value;

use super::persona::Persona;
use super::prompts::build_questionnaire_prompt;
use super::retry::RetryPolicy;
use crate::config::LlmSettings;
use crate::error::{ParseFailure, SynthesisError};
use crate::llm::{complete, GenerationRequest, LlmProvider};
use crate::schema::QuestionSchema;
use crate::store::RecordSink;
use crate::survey::record::value_to_text;
use crate::survey::{
    contains_question_number, leading_question_number, normalize_answer, skip_logic, Answer,
    FormatWarning, RespondentRecord, SKIP,
};
use crate::utils::json_extraction::extract_json_object;

/// A response converted into a standardized record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Standardized {
    /// The record, in schema column order.
    pub record: RespondentRecord,
    /// Answers that failed their kind's post-condition.
    pub warnings: Vec<FormatWarning>,
}

/// Counters accumulated across every `synthesize` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SynthesisReport {
    /// Records accepted and persisted.
    pub accepted: usize,
    /// Responses rejected as malformed.
    pub parse_failures: usize,
    /// Generation calls that failed or timed out.
    pub generation_failures: usize,
    /// Answers kept despite failing their format check.
    pub format_warnings: usize,
}

/// Extracts `(column_key, answer)` pairs from a model reply.
pub fn parse_answer_pairs(text: &str) -> Result<Vec<(String, String)>, ParseFailure> {
    let json = extract_json_object(text).ok_or(ParseFailure::NoJson)?;
    let document: Value =
        serde_json::from_str(&json).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
    let items = document
        .get("answers")
        .and_then(Value::as_array)
        .ok_or(ParseFailure::MissingAnswers)?;

    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            let key = item.get("col_name").map(value_to_text);
            let answer = item.get("answer").map(value_to_text);
            match (key, answer) {
                (Some(key), Some(answer)) => Ok((key, answer)),
                _ => Err(ParseFailure::InvalidJson(format!(
                    "answers[{}] needs col_name and answer",
                    idx
                ))),
            }
        })
        .collect()
}

/// Turns a model reply into a standardized record.
///
/// Steps: parse the pairs, reject replies without any question-numbered key,
/// re-key onto the schema (missing questions become [`SKIP`]), apply skip
/// logic, normalize each answer by its kind, then apply skip logic again so
/// a gate answered as a digit still cascades.
pub fn standardize_response(
    schema: &QuestionSchema,
    text: &str,
    cluster_id: &str,
    source_seq: u64,
) -> Result<Standardized, ParseFailure> {
    let pairs = parse_answer_pairs(text)?;
    if !pairs.iter().any(|(key, _)| contains_question_number(key)) {
        return Err(ParseFailure::NoQuestionNumbers);
    }

    let answers = schema
        .questions()
        .iter()
        .map(|question| {
            let value = pairs
                .iter()
                .find(|(key, _)| leading_question_number(key) == Some(question.number))
                .map(|(_, value)| value.as_str())
                .unwrap_or(SKIP);
            Answer::new(question.column_label.as_str(), value)
        })
        .collect();

    let mut record = skip_logic::apply(RespondentRecord::new(answers, cluster_id, source_seq));

    let mut warnings = Vec::new();
    for answer in record.answers_mut() {
        let Some(question) = answer.column.question() else {
            continue;
        };
        let Some(kind) = schema.kind_of(question) else {
            continue;
        };
        let normalized = normalize_answer(question, kind, &answer.value);
        answer.value = normalized.value;
        warnings.extend(normalized.warning);
    }
    skip_logic::apply_in_place(&mut record);

    Ok(Standardized { record, warnings })
}

/// Generates questionnaires for personas.
///
/// The source sequence number increases across every call on the same
/// synthesizer, so one instance should serve a whole run.
pub struct QuestionnaireSynthesizer<'a> {
    llm: Arc<dyn LlmProvider>,
    schema: &'a QuestionSchema,
    settings: LlmSettings,
    retry: RetryPolicy,
    rng: ChaCha8Rng,
    next_seq: u64,
    report: SynthesisReport,
}

impl<'a> QuestionnaireSynthesizer<'a> {
    /// Creates a synthesizer over `schema`.
    pub fn new(llm: Arc<dyn LlmProvider>, schema: &'a QuestionSchema, settings: LlmSettings) -> Self {
        Self {
            llm,
            schema,
            settings,
            retry: RetryPolicy::default(),
            rng: ChaCha8Rng::from_rng(&mut rand::rng()),
            next_seq: 1,
            report: SynthesisReport::default(),
        }
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Seeds the temperature spread.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        if let Some(seed) = seed {
            self.rng = ChaCha8Rng::seed_from_u64(seed);
        }
        self
    }

    /// Counters so far.
    pub fn report(&self) -> &SynthesisReport {
        &self.report
    }

    /// Sequence number the next accepted record receives.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Base temperature plus a uniform draw from `[-spread, spread]`.
    pub fn sample_temperature(&mut self) -> f64 {
        let spread = self.settings.temperature_spread;
        let jitter = if spread > 0.0 {
            self.rng.random_range(-spread..=spread)
        } else {
            0.0
        };
        self.settings.questionnaire_temperature + jitter
    }

    /// Generates `target` accepted records for one persona.
    ///
    /// Each record is appended to `sink` as soon as it is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::GenerationExhausted`] when `max_attempts`
    /// consecutive calls fail or are rejected, and
    /// [`SynthesisError::Store`] when the sink cannot be written.
    pub async fn synthesize(
        &mut self,
        cluster_id: usize,
        persona: &Persona,
        target: usize,
        sink: &mut dyn RecordSink,
    ) -> Result<Vec<RespondentRecord>, SynthesisError> {
        let prompt =
            build_questionnaire_prompt(&persona.prompt_text(), &self.schema.render_for_prompt())?;
        let cluster_label = cluster_id.to_string();
        let mut records = Vec::with_capacity(target);
        let mut failures = 0u32;

        tracing::info!(cluster_id, target, "Synthesizing questionnaires");

        while records.len() < target {
            let delay = self.retry.delay_for(failures);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let temperature = self.sample_temperature();
            let request = GenerationRequest::new(self.settings.model.clone(), prompt.messages())
                .with_temperature(temperature)
                .with_max_tokens(self.settings.max_tokens);

            let reply =
                complete(self.llm.as_ref(), request, self.settings.request_timeout()).await;
            let last_error = match reply {
                Err(e) => {
                    self.report.generation_failures += 1;
                    tracing::warn!(cluster_id, attempt = failures + 1, error = %e, "Questionnaire generation failed");
                    e.to_string()
                }
                Ok(text) => {
                    match standardize_response(self.schema, &text, &cluster_label, self.next_seq) {
                        Err(failure) => {
                            self.report.parse_failures += 1;
                            tracing::warn!(cluster_id, attempt = failures + 1, error = %failure, "Questionnaire response rejected");
                            failure.to_string()
                        }
                        Ok(Standardized { record, warnings }) => {
                            for warning in &warnings {
                                tracing::warn!(
                                    cluster_id,
                                    source_seq = record.source_seq(),
                                    question = warning.question,
                                    "Format warning: {}",
                                    warning
                                );
                            }
                            self.report.format_warnings += warnings.len();

                            sink.append(&record)?;
                            self.next_seq += 1;
                            self.report.accepted += 1;
                            failures = 0;
                            tracing::debug!(
                                cluster_id,
                                source_seq = record.source_seq(),
                                progress = records.len() + 1,
                                target,
                                "Questionnaire accepted"
                            );
                            records.push(record);
                            continue;
                        }
                    }
                }
            };

            failures += 1;
            if self.retry.is_exhausted(failures) {
                tracing::error!(cluster_id, attempts = failures, error = %last_error, "Giving up on cluster");
                return Err(SynthesisError::GenerationExhausted {
                    cluster_id: cluster_label,
                    attempts: failures,
                    last_error,
                });
            }
        }

        tracing::info!(cluster_id, generated = records.len(), "Cluster synthesis complete");
        Ok(records)
    }
}
