//! Run orchestrator.
//!
//! Wires the stages of one augmentation run in order:
//!
//! 1. Load the question schema and the respondent dataset
//! 2. Encode respondents and cluster them
//! 3. Decide persona dimensions, write one persona per cluster, apply exclusions
//! 4. Allocate per-cluster targets
//! 5. Synthesize questionnaires into the generated store
//! 6. Jitter the generated set (when enabled)
//! 7. Write parquet snapshots and the analysis summary
//!
//! The schema is loaded before anything else so a bad schema aborts the run
//! before any model call is made.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::analysis::{summarize, Summary};
use crate::clustering::{encode_features, Clusterer, Clustering, KMedoids};
use crate::config::{ConfigError, ForgeConfig, JitterProbabilities};
use crate::error::{ClusteringError, SchemaError, StoreError, SynthesisError};
use crate::jitter::JitterEngine;
use crate::llm::LlmProvider;
use crate::schema::QuestionSchema;
use crate::store::{read_records, write_parquet, ColumnLayout, JsonlStore};
use crate::survey::{RespondentRecord, SurveyDataset};
use crate::synthesis::{
    allocate_targets, apply_exclusions, Exclusion, Persona, PersonaSynthesizer,
    QuestionnaireSynthesizer, RetryPolicy, SynthesisReport,
};

const STAGES: usize = 7;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Schema or dataset could not be loaded.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Clustering failed.
    #[error("Clustering error: {0}")]
    Clustering(#[from] ClusteringError),

    /// Persona or questionnaire synthesis failed.
    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// Output could not be written.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Personas kept after exclusion.
    pub personas: BTreeMap<usize, Persona>,
    /// Clusters removed before allocation.
    pub exclusion: Exclusion,
    /// Target record count per persona.
    pub targets: BTreeMap<usize, usize>,
    /// Synthesis counters.
    pub report: SynthesisReport,
    /// Accepted records.
    pub generated: Vec<RespondentRecord>,
    /// Jittered records; equal to `generated` when jitter is disabled.
    pub jittered: Vec<RespondentRecord>,
    /// Post-run analysis.
    pub summary: Summary,
}

/// One augmentation run over a configuration and a model provider.
pub struct Pipeline {
    config: ForgeConfig,
    llm: Arc<dyn LlmProvider>,
    clusterer: Box<dyn Clusterer + Send + Sync>,
}

impl Pipeline {
    /// Creates a pipeline using seeded k-medoids clustering.
    pub fn new(config: ForgeConfig, llm: Arc<dyn LlmProvider>) -> Self {
        let clusterer = Box::new(KMedoids::new().with_seed(config.seed));
        Self {
            config,
            llm,
            clusterer,
        }
    }

    /// Replaces the clustering algorithm.
    pub fn with_clusterer(mut self, clusterer: Box<dyn Clusterer + Send + Sync>) -> Self {
        self.clusterer = clusterer;
        self
    }

    /// The run configuration.
    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    /// Runs every stage in order.
    pub async fn run(&self) -> Result<RunOutcome, PipelineError> {
        let config = &self.config;
        config.validate()?;
        let retry = RetryPolicy::from(&config.retry);

        stage(1, "Loading question schema and survey data");
        let schema = QuestionSchema::load(&config.schema_path)?;
        let dataset = SurveyDataset::load(&config.data_path, &schema)?;

        stage(2, "Encoding respondents and clustering");
        let features = encode_features(&dataset, &schema);
        tracing::info!(
            respondents = features.values.nrows(),
            features = features.values.ncols(),
            k = config.cluster_count,
            "Feature matrix encoded"
        );
        let mut clustering = self.clusterer.fit(&features.values, config.cluster_count)?;
        for (cluster_id, count) in clustering.counts() {
            tracing::info!(cluster_id, count, "Cluster size");
        }

        stage(3, "Writing personas");
        let personas_llm = PersonaSynthesizer::new(Arc::clone(&self.llm), config.llm.clone())
            .with_retry(retry);
        let headers = schema.column_labels();
        let dimensions = personas_llm.decide_aspects(&headers).await?;
        tracing::info!(dimensions = ?dimensions, "Persona dimensions decided");
        let mut personas = personas_llm
            .generate(&dataset, &features.values, &clustering, &dimensions)
            .await?;
        save_personas(&personas, &config.personas_path())?;
        let exclusion = apply_exclusions(&mut personas, &mut clustering, &config.excluded_clusters);

        stage(4, "Allocating targets");
        let targets = allocation_for(&personas, &clustering, config.target_total);
        for (cluster_id, target) in &targets {
            tracing::info!(cluster_id, target, "Cluster target");
        }

        stage(5, "Synthesizing questionnaires");
        let (generated, report) = self.synthesize(&schema, &personas, &targets, retry).await?;

        stage(6, "Jittering");
        let jittered = if config.jitter_enabled {
            let mut engine = JitterEngine::new(&schema, config.jitter.clone(), config.seed);
            let mut store = JsonlStore::create(&config.jittered_path(), true)?;
            engine.jitter_all(&generated, &mut store)?
        } else {
            tracing::info!("Jitter disabled, reusing the generated set");
            generated.clone()
        };

        stage(7, "Writing snapshots and analysis");
        let columns = schema.column_labels();
        snapshot(&generated, &ColumnLayout::generated(columns.clone()), &config.generated_parquet_path())?;
        if config.jitter_enabled {
            snapshot(&jittered, &ColumnLayout::jittered(columns), &config.jittered_parquet_path())?;
        }
        let summary = summarize(&dataset, &generated, &jittered, &schema).with_original_clusters(&clustering);
        summary.log();
        summary.save(&config.summary_path())?;

        tracing::info!(
            accepted = report.accepted,
            parse_failures = report.parse_failures,
            generation_failures = report.generation_failures,
            format_warnings = report.format_warnings,
            output_dir = %config.output_dir.display(),
            "Run complete"
        );

        Ok(RunOutcome {
            personas,
            exclusion,
            targets,
            report,
            generated,
            jittered,
            summary,
        })
    }

    async fn synthesize(
        &self,
        schema: &QuestionSchema,
        personas: &BTreeMap<usize, Persona>,
        targets: &BTreeMap<usize, usize>,
        retry: RetryPolicy,
    ) -> Result<(Vec<RespondentRecord>, SynthesisReport), PipelineError> {
        let mut synthesizer =
            QuestionnaireSynthesizer::new(Arc::clone(&self.llm), schema, self.config.llm.clone())
                .with_retry(retry)
                .with_seed(self.config.seed);
        let mut store = JsonlStore::create(&self.config.generated_path(), false)?;
        let mut generated = Vec::new();

        for (cluster_id, persona) in personas {
            let target = targets.get(cluster_id).copied().unwrap_or(1);
            let records = synthesizer
                .synthesize(*cluster_id, persona, target, &mut store)
                .await?;
            generated.extend(records);
        }

        tracing::info!(
            path = %store.path().display(),
            written = store.written(),
            "Generated questionnaires stored"
        );
        Ok((generated, synthesizer.report().clone()))
    }
}

/// Re-runs only the jitter stage on a stored generated file.
///
/// Returns the number of jittered records written to `output`.
pub fn jitter_file(
    schema: &QuestionSchema,
    input: &Path,
    output: &Path,
    probabilities: JitterProbabilities,
    seed: Option<u64>,
) -> Result<usize, PipelineError> {
    let generated = read_records(input)?;
    tracing::info!(path = %input.display(), records = generated.len(), "Generated records loaded");

    let mut engine = JitterEngine::new(schema, probabilities, seed);
    let mut store = JsonlStore::create(output, true)?;
    let jittered = engine.jitter_all(&generated, &mut store)?;
    Ok(jittered.len())
}

fn stage(index: usize, name: &str) {
    tracing::info!("stage {}/{}: {}", index, STAGES, name);
}

/// Targets for every kept persona, by its cluster's remaining respondents.
fn allocation_for(
    personas: &BTreeMap<usize, Persona>,
    clustering: &Clustering,
    total: usize,
) -> BTreeMap<usize, usize> {
    let counts = clustering.counts();
    let per_persona = personas
        .keys()
        .map(|id| (*id, counts.get(id).copied().unwrap_or(0)))
        .collect();
    allocate_targets(total, &per_persona)
}

fn save_personas(personas: &BTreeMap<usize, Persona>, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(personas)?)?;
    tracing::info!(path = %path.display(), personas = personas.len(), "Personas saved");
    Ok(())
}

fn snapshot(records: &[RespondentRecord], layout: &ColumnLayout, path: &Path) -> Result<(), StoreError> {
    if records.is_empty() {
        tracing::warn!(path = %path.display(), "No records, skipping parquet snapshot");
        return Ok(());
    }
    let rows = write_parquet(records, layout, path)?;
    tracing::info!(path = %path.display(), rows, "Parquet snapshot written");
    Ok(())
}
