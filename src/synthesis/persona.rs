//! Persona synthesis.
//!
//! The model first chooses persona dimensions from the survey's column
//! labels, then writes one persona per cluster from the cluster's
//! representative respondent.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::prompts::{build_aspect_prompt, build_persona_prompt, SurveyPrompt};
use super::retry::RetryPolicy;
use crate::clustering::Clustering;
use crate::config::LlmSettings;
use crate::error::{LlmError, SynthesisError};
use crate::llm::{complete, GenerationRequest, LlmProvider};
use crate::survey::record::value_to_text;
use crate::survey::SurveyDataset;
use crate::utils::json_extraction::{extract_json_object, strip_code_fences};

/// Dimensions used when the model's choice cannot be parsed.
pub const FALLBACK_DIMENSIONS: [&str; 4] = ["年级", "专业类别", "对AIGC了解程度", "其它"];

const ASPECT_TEMPERATURE: f64 = 0.7;
const ASPECT_MAX_TOKENS: u32 = 1024;
const PERSONA_MAX_TOKENS: u32 = 512;

/// A typical-respondent description for one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    /// Cluster this persona describes.
    pub cluster_id: usize,
    /// Respondents in the cluster when the persona was written.
    pub cluster_size: usize,
    /// Index of the representative respondent in the dataset.
    pub representative: usize,
    /// Model output with code fences removed.
    pub text: String,
}

impl Persona {
    /// Text embedded into questionnaire prompts.
    ///
    /// A JSON object is rendered as `key: value` lines; anything else is
    /// used verbatim.
    pub fn prompt_text(&self) -> String {
        match serde_json::from_str::<Value>(&self.text) {
            Ok(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, value_to_text(v)))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => self.text.clone(),
        }
    }
}

/// Outcome of removing clusters from synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusion {
    /// Cluster ids actually removed.
    pub removed: Vec<usize>,
    /// Respondents relabelled as unassigned.
    pub dropped_respondents: usize,
}

/// Drops the requested clusters from `personas` and `clustering`.
///
/// Ids without a persona are ignored.
pub fn apply_exclusions(
    personas: &mut BTreeMap<usize, Persona>,
    clustering: &mut Clustering,
    excluded: &BTreeSet<usize>,
) -> Exclusion {
    let removed: BTreeSet<usize> = excluded
        .iter()
        .copied()
        .filter(|id| personas.contains_key(id))
        .collect();
    personas.retain(|id, _| !removed.contains(id));
    let dropped_respondents = clustering.exclude(&removed);

    tracing::info!(
        removed = ?removed,
        remaining = ?personas.keys().collect::<Vec<_>>(),
        dropped_respondents,
        "Clusters excluded"
    );

    Exclusion {
        removed: removed.into_iter().collect(),
        dropped_respondents,
    }
}

/// Renders the dimension schema embedded into persona prompts.
///
/// The flattened dimension list is sliced into three groups of at most three.
pub fn dimension_schema(dimensions: &[String]) -> String {
    let slice = |from: usize| -> Vec<&String> { dimensions.iter().skip(from).take(3).collect() };
    serde_json::json!({
        "base_attributes": slice(0),
        "cognitive_traits": slice(3),
        "behavior_patterns": slice(6),
    })
    .to_string()
}

/// One-line summary of a cluster.
pub fn cluster_profile(cluster_id: usize, size: usize) -> String {
    format!("这是第{}个聚类，样本量={}", cluster_id, size)
}

/// Parses the model's dimension choice into a flat list.
fn parse_dimensions(response: &str) -> Option<Vec<String>> {
    let json = extract_json_object(response)?;
    let Value::Object(map) = serde_json::from_str::<Value>(&json).ok()? else {
        return None;
    };

    let dimensions: Vec<String> = ["base_attributes", "cognitive_traits", "behavior_patterns"]
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_array))
        .flatten()
        .map(value_to_text)
        .filter(|d| !d.is_empty())
        .collect();

    (!dimensions.is_empty()).then_some(dimensions)
}

/// Writes personas with a language model.
pub struct PersonaSynthesizer {
    llm: Arc<dyn LlmProvider>,
    settings: LlmSettings,
    retry: RetryPolicy,
}

impl PersonaSynthesizer {
    /// Creates a synthesizer using `settings` for model, temperature and timeout.
    pub fn new(llm: Arc<dyn LlmProvider>, settings: LlmSettings) -> Self {
        Self {
            llm,
            settings,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Asks the model which persona dimensions fit the survey.
    ///
    /// Any generation or parse failure yields [`FALLBACK_DIMENSIONS`].
    pub async fn decide_aspects(&self, headers: &[String]) -> Result<Vec<String>, SynthesisError> {
        let prompt = build_aspect_prompt(headers)?;
        let request = self
            .request(&prompt, ASPECT_MAX_TOKENS)
            .with_temperature(ASPECT_TEMPERATURE);

        let dimensions = match complete(self.llm.as_ref(), request, self.settings.request_timeout()).await {
            Ok(text) => parse_dimensions(&text),
            Err(e) => {
                tracing::warn!(error = %e, "Persona dimension request failed");
                None
            }
        };

        Ok(dimensions.unwrap_or_else(|| {
            tracing::warn!("Using fallback persona dimensions");
            FALLBACK_DIMENSIONS.iter().map(|d| d.to_string()).collect()
        }))
    }

    /// Writes one persona for every cluster that has members.
    pub async fn generate(
        &self,
        dataset: &SurveyDataset,
        features: &Array2<f64>,
        clustering: &Clustering,
        dimensions: &[String],
    ) -> Result<BTreeMap<usize, Persona>, SynthesisError> {
        let schema = dimension_schema(dimensions);
        let mut personas = BTreeMap::new();

        for cluster_id in 0..clustering.k() {
            let Some(representative) = clustering.representative(features, cluster_id) else {
                tracing::debug!(cluster_id, "Cluster has no members, skipping persona");
                continue;
            };
            let cluster_size = clustering.members(cluster_id).len();
            let sample = dataset.describe_row(representative).unwrap_or_default();
            let prompt = build_persona_prompt(
                &schema,
                &cluster_profile(cluster_id, cluster_size),
                &sample,
            )?;

            tracing::info!(cluster_id, cluster_size, representative, "Generating persona");
            let text = self.generate_text(cluster_id, &prompt).await?;
            personas.insert(
                cluster_id,
                Persona {
                    cluster_id,
                    cluster_size,
                    representative,
                    text,
                },
            );
        }

        Ok(personas)
    }

    async fn generate_text(
        &self,
        cluster_id: usize,
        prompt: &SurveyPrompt,
    ) -> Result<String, SynthesisError> {
        let mut failures = 0u32;
        loop {
            let delay = self.retry.delay_for(failures);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let request = self
                .request(prompt, PERSONA_MAX_TOKENS)
                .with_temperature(self.settings.persona_temperature);
            let error = match complete(self.llm.as_ref(), request, self.settings.request_timeout()).await {
                Ok(text) => {
                    let text = strip_code_fences(&text);
                    if !text.is_empty() {
                        return Ok(text);
                    }
                    LlmError::ParseError("empty persona".to_string())
                }
                Err(e) => e,
            };

            failures += 1;
            tracing::warn!(cluster_id, attempt = failures, error = %error, "Persona generation failed");
            if self.retry.is_exhausted(failures) {
                return Err(SynthesisError::GenerationExhausted {
                    cluster_id: cluster_id.to_string(),
                    attempts: failures,
                    last_error: error.to_string(),
                });
            }
        }
    }

    fn request(&self, prompt: &SurveyPrompt, max_tokens: u32) -> GenerationRequest {
        GenerationRequest::new(self.settings.model.clone(), prompt.messages())
            .with_max_tokens(max_tokens)
    }
}
