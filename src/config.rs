//! Run configuration.
//!
//! A [`ForgeConfig`] starts from defaults, is optionally overlaid by a YAML
//! file, then by `FORGE_*` environment variables, then by CLI flags. Call
//! [`ForgeConfig::validate`] once all layers are applied.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::{DEFAULT_API_BASE, DEFAULT_MODEL};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable or flag has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid YAML for this schema.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Language model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// Bearer token. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// Temperature for persona generation.
    pub persona_temperature: f64,
    /// Base temperature for questionnaire generation.
    pub questionnaire_temperature: f64,
    /// Half-width of the uniform spread added to the questionnaire temperature.
    pub temperature_spread: f64,
    /// Completion token limit per call.
    pub max_tokens: u32,
    /// Timeout for a single generation call.
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            persona_temperature: 0.3,
            questionnaire_temperature: 0.15,
            temperature_spread: 0.05,
            max_tokens: 2048,
            request_timeout_secs: 120,
        }
    }
}

impl LlmSettings {
    /// Timeout for a single generation call.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Bounded retry settings for generation calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Attempts allowed per accepted record.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_backoff_ms: u64,
    /// Upper bound for the exponential delay.
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 500,
            max_backoff_ms: 8000,
        }
    }
}

/// Probabilities driving the jitter engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterProbabilities {
    /// Chance that a "Yes" on question 5 flips to "No".
    pub q5_flip: f64,
    /// Chance that question 35 flips to the opposite answer.
    pub q35_flip: f64,
    /// Chance that a multi-choice answer is perturbed.
    pub multi: f64,
    /// Chance that a multi-choice perturbation drops rather than adds.
    pub multi_drop: f64,
    /// Chance that a scale answer shifts by one.
    pub scale: f64,
    /// Chance that a single-choice answer is redrawn.
    pub single: f64,
}

impl Default for JitterProbabilities {
    fn default() -> Self {
        Self {
            q5_flip: 0.05,
            q35_flip: 0.10,
            multi: 0.2,
            multi_drop: 0.5,
            scale: 0.2,
            single: 0.1,
        }
    }
}

impl JitterProbabilities {
    /// Every probability set to `p`.
    pub fn uniform(p: f64) -> Self {
        Self {
            q5_flip: p,
            q35_flip: p,
            multi: p,
            multi_drop: p,
            scale: p,
            single: p,
        }
    }

    fn entries(&self) -> [(&'static str, f64); 6] {
        [
            ("q5_flip", self.q5_flip),
            ("q35_flip", self.q35_flip),
            ("multi", self.multi),
            ("multi_drop", self.multi_drop),
            ("scale", self.scale),
            ("single", self.single),
        ]
    }
}

/// Configuration for a survey-forge run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Question schema document.
    pub schema_path: PathBuf,
    /// Original respondent data (JSON array or JSONL).
    pub data_path: PathBuf,
    /// Directory receiving every output file.
    pub output_dir: PathBuf,
    /// Total number of questionnaires to synthesize.
    pub target_total: usize,
    /// Number of respondent clusters.
    pub cluster_count: usize,
    /// Cluster ids dropped before persona allocation.
    pub excluded_clusters: BTreeSet<usize>,
    /// Whether the jitter stage runs.
    pub jitter_enabled: bool,
    /// Seed for clustering, temperature spread and jitter.
    pub seed: Option<u64>,
    /// Language model settings.
    pub llm: LlmSettings,
    /// Retry settings.
    pub retry: RetrySettings,
    /// Jitter probabilities.
    pub jitter: JitterProbabilities,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from("data/question_schema.json"),
            data_path: PathBuf::from("data/survey.jsonl"),
            output_dir: PathBuf::from("output"),
            target_total: 1000,
            cluster_count: 4,
            excluded_clusters: BTreeSet::new(),
            jitter_enabled: true,
            seed: None,
            llm: LlmSettings::default(),
            retry: RetrySettings::default(),
            jitter: JitterProbabilities::default(),
        }
    }
}

impl ForgeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a YAML file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Configuration file loaded");
        Ok(config)
    }

    /// Applies `FORGE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `FORGE_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Paths
        if let Some(val) = lookup("FORGE_SCHEMA_PATH") {
            self.schema_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("FORGE_DATA_PATH") {
            self.data_path = PathBuf::from(val);
        }
        if let Some(val) = lookup("FORGE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(val);
        }

        // Run shape
        if let Some(val) = lookup("FORGE_TARGET_TOTAL") {
            self.target_total = parse_env_value(&val, "FORGE_TARGET_TOTAL")?;
        }
        if let Some(val) = lookup("FORGE_CLUSTER_COUNT") {
            self.cluster_count = parse_env_value(&val, "FORGE_CLUSTER_COUNT")?;
        }
        if let Some(val) = lookup("FORGE_EXCLUDED_CLUSTERS") {
            self.excluded_clusters = parse_cluster_list(&val, "FORGE_EXCLUDED_CLUSTERS")?;
        }
        if let Some(val) = lookup("FORGE_JITTER_ENABLED") {
            self.jitter_enabled = parse_env_bool(&val, "FORGE_JITTER_ENABLED")?;
        }
        if let Some(val) = lookup("FORGE_SEED") {
            self.seed = Some(parse_env_value(&val, "FORGE_SEED")?);
        }

        // LLM settings
        if let Some(val) = lookup("FORGE_API_BASE") {
            self.llm.api_base = val;
        }
        if let Some(val) = lookup("FORGE_API_KEY").or_else(|| lookup("DEEPSEEK_API_KEY")) {
            self.llm.api_key = Some(val);
        }
        if let Some(val) = lookup("FORGE_MODEL") {
            self.llm.model = val;
        }
        if let Some(val) = lookup("FORGE_REQUEST_TIMEOUT_SECS") {
            self.llm.request_timeout_secs = parse_env_value(&val, "FORGE_REQUEST_TIMEOUT_SECS")?;
        }

        // Retry settings
        if let Some(val) = lookup("FORGE_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_env_value(&val, "FORGE_MAX_ATTEMPTS")?;
        }

        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_total == 0 {
            return Err(ConfigError::ValidationFailed(
                "target_total must be greater than 0".to_string(),
            ));
        }

        if self.cluster_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "cluster_count must be greater than 0".to_string(),
            ));
        }

        if self.llm.model.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm.model cannot be empty".to_string(),
            ));
        }

        if self.llm.api_base.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm.api_base cannot be empty".to_string(),
            ));
        }

        for (name, temp) in [
            ("persona_temperature", self.llm.persona_temperature),
            ("questionnaire_temperature", self.llm.questionnaire_temperature),
        ] {
            if !(0.0..=2.0).contains(&temp) {
                return Err(ConfigError::ValidationFailed(format!(
                    "llm.{} must be between 0.0 and 2.0",
                    name
                )));
            }
        }

        if self.llm.temperature_spread < 0.0
            || self.llm.temperature_spread > self.llm.questionnaire_temperature
        {
            return Err(ConfigError::ValidationFailed(
                "llm.temperature_spread must be between 0.0 and questionnaire_temperature"
                    .to_string(),
            ));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "llm.request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::ValidationFailed(
                "retry.initial_backoff_ms cannot exceed retry.max_backoff_ms".to_string(),
            ));
        }

        for (name, p) in self.jitter.entries() {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::ValidationFailed(format!(
                    "jitter.{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Incrementally written synthesized questionnaires.
    pub fn generated_path(&self) -> PathBuf {
        self.output_dir.join("generated.jsonl")
    }

    /// Incrementally written jittered questionnaires.
    pub fn jittered_path(&self) -> PathBuf {
        self.output_dir.join("jittered.jsonl")
    }

    /// Parquet snapshot of the synthesized set.
    pub fn generated_parquet_path(&self) -> PathBuf {
        self.output_dir.join("generated.parquet")
    }

    /// Parquet snapshot of the jittered set.
    pub fn jittered_parquet_path(&self) -> PathBuf {
        self.output_dir.join("jittered.parquet")
    }

    /// Personas keyed by cluster id.
    pub fn personas_path(&self) -> PathBuf {
        self.output_dir.join("personas.json")
    }

    /// Analysis summary.
    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("summary.json")
    }

    /// Builder method to set the target total.
    pub fn with_target_total(mut self, total: usize) -> Self {
        self.target_total = total;
        self
    }

    /// Builder method to set the cluster count.
    pub fn with_cluster_count(mut self, k: usize) -> Self {
        self.cluster_count = k;
        self
    }

    /// Builder method to set excluded clusters.
    pub fn with_excluded_clusters(mut self, clusters: impl IntoIterator<Item = usize>) -> Self {
        self.excluded_clusters = clusters.into_iter().collect();
        self
    }

    /// Builder method to set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Builder method to enable or disable jitter.
    pub fn with_jitter_enabled(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Builder method to set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

/// Parses a comma separated cluster id list such as `1,3`.
pub fn parse_cluster_list(value: &str, key: &str) -> Result<BTreeSet<usize>, ConfigError> {
    value
        .split([',', '，', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_env_value(s, key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ForgeConfig::default();
        assert_eq!(config.target_total, 1000);
        assert_eq!(config.cluster_count, 4);
        assert!(config.jitter_enabled);
        assert_eq!(config.llm.model, "deepseek-reasoner");
        assert!((config.llm.questionnaire_temperature - 0.15).abs() < f64::EPSILON);
        assert!((config.jitter.q35_flip - 0.10).abs() < f64::EPSILON);
        assert_eq!(config.retry.max_attempts, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_overlays_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "target_total: 20\nexcluded_clusters: [1, 3]\njitter:\n  single: 1.0\nllm:\n  model: test-model"
        )
        .expect("write");

        let config = ForgeConfig::from_file(file.path()).expect("loads");
        assert_eq!(config.target_total, 20);
        assert_eq!(config.excluded_clusters, BTreeSet::from([1, 3]));
        assert!((config.jitter.single - 1.0).abs() < f64::EPSILON);
        assert!((config.jitter.scale - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.llm.model, "test-model");
        assert_eq!(config.cluster_count, 4);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("FORGE_TARGET_TOTAL", "50"),
            ("FORGE_EXCLUDED_CLUSTERS", "0, 2"),
            ("FORGE_JITTER_ENABLED", "off"),
            ("DEEPSEEK_API_KEY", "sk-test"),
        ]);
        let mut config = ForgeConfig::default();
        config
            .apply_env_from(|key| vars.get(key).map(|v| v.to_string()))
            .expect("valid overrides");

        assert_eq!(config.target_total, 50);
        assert_eq!(config.excluded_clusters, BTreeSet::from([0, 2]));
        assert!(!config.jitter_enabled);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_env_invalid_value() {
        let mut config = ForgeConfig::default();
        let err = config
            .apply_env_from(|key| (key == "FORGE_SEED").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FORGE_SEED"));
    }

    #[test]
    fn test_validation_rejects_out_of_range_probability() {
        let mut config = ForgeConfig::default();
        config.jitter.multi = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jitter.multi"));
    }

    #[test]
    fn test_validation_rejects_zero_attempts() {
        let mut config = ForgeConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let mut config = ForgeConfig::default();
        config.llm.api_key = Some("secret".to_string());
        let yaml = serde_yaml::to_string(&config).expect("serializes");
        assert!(!yaml.contains("secret"));
    }

    #[test]
    fn test_output_paths() {
        let config = ForgeConfig::default().with_output_dir("/tmp/run");
        assert_eq!(config.generated_path(), PathBuf::from("/tmp/run/generated.jsonl"));
        assert_eq!(config.summary_path(), PathBuf::from("/tmp/run/summary.json"));
    }
}
