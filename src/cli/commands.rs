//! CLI command definitions for survey-forge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::config::{parse_cluster_list, ForgeConfig};
use crate::llm::ChatClient;
use crate::pipeline::{jitter_file, Pipeline};
use crate::schema::{QuestionKind, QuestionSchema};

/// Survey augmentation with persona-conditioned language model synthesis.
#[derive(Parser)]
#[command(name = "survey-forge")]
#[command(about = "Augment a university AIGC usage survey with synthesized questionnaires")]
#[command(version)]
#[command(
    long_about = "survey-forge clusters the original respondents, writes one persona per cluster, \
asks a language model to answer the questionnaire as each persona, then jitters the results.\n\n\
Example usage:\n  survey-forge run --schema data/question_schema.json --data data/survey.jsonl --target 500 --exclude 3"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full augmentation pipeline.
    Run(RunArgs),

    /// Re-run only the jitter stage on an existing generated file.
    Jitter(JitterArgs),

    /// Print a summary of a question schema.
    Schema(SchemaArgs),
}

/// Arguments for `survey-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML configuration file; flags override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Question schema document.
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Original respondent data (JSON array or JSONL).
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Output directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Total number of questionnaires to synthesize.
    #[arg(short, long)]
    pub target: Option<usize>,

    /// Number of respondent clusters.
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Comma-separated cluster ids to drop (e.g. "1,3").
    #[arg(long)]
    pub exclude: Option<String>,

    /// Seed for clustering, temperature sampling and jitter.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Skip the jitter stage.
    #[arg(long)]
    pub no_jitter: bool,

    /// Model name.
    #[arg(short, long)]
    pub model: Option<String>,

    /// API key for the chat completion endpoint.
    #[arg(long, env = "FORGE_API_KEY")]
    pub api_key: Option<String>,
}

/// Arguments for `survey-forge jitter`.
#[derive(Parser, Debug)]
pub struct JitterArgs {
    /// Generated JSONL file.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Destination JSONL file for jittered records.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Question schema document.
    #[arg(long, default_value = "data/question_schema.json")]
    pub schema: PathBuf,

    /// YAML configuration file supplying jitter probabilities.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Jitter seed.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for `survey-forge schema`.
#[derive(Parser, Debug)]
pub struct SchemaArgs {
    /// Question schema document.
    #[arg(long, default_value = "data/question_schema.json")]
    pub schema: PathBuf,
}

/// Result printed after a successful run.
#[derive(Debug, Serialize)]
struct RunOutput {
    personas: Vec<usize>,
    excluded: Vec<usize>,
    generated: usize,
    jittered: usize,
    parse_failures: usize,
    generation_failures: usize,
    format_warnings: usize,
    output_dir: String,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parse arguments and execute the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Execute an already parsed command line.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::Jitter(args) => run_jitter_command(args),
        Commands::Schema(args) => run_schema_command(args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ForgeConfig> {
    let mut config = match path {
        Some(path) => ForgeConfig::from_file(path)?,
        None => ForgeConfig::default(),
    };
    config.apply_env()?;
    Ok(config)
}

/// Layers flags over the file and environment configuration.
fn build_run_config(args: &RunArgs) -> anyhow::Result<ForgeConfig> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(schema) = &args.schema {
        config.schema_path = schema.clone();
    }
    if let Some(data) = &args.data {
        config.data_path = data.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(target) = args.target {
        config.target_total = target;
    }
    if let Some(k) = args.clusters {
        config.cluster_count = k;
    }
    if let Some(exclude) = &args.exclude {
        config.excluded_clusters = parse_cluster_list(exclude, "--exclude")?;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.no_jitter {
        config.jitter_enabled = false;
    }
    if let Some(model) = &args.model {
        config.llm.model = model.clone();
    }
    if let Some(key) = &args.api_key {
        config.llm.api_key = Some(key.clone());
    }

    config.validate()?;
    Ok(config)
}

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let config = build_run_config(&args)?;
    if config.llm.api_key.is_none() {
        tracing::warn!("No API key configured, requests will be sent unauthenticated");
    }

    let client = ChatClient::new(
        config.llm.api_base.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
        config.llm.request_timeout(),
    )?;
    info!(
        api_base = client.api_base(),
        model = client.default_model(),
        target = config.target_total,
        clusters = config.cluster_count,
        "Starting survey augmentation"
    );

    let output_dir = config.output_dir.display().to_string();
    let outcome = Pipeline::new(config, Arc::new(client)).run().await?;

    let output = RunOutput {
        personas: outcome.personas.keys().copied().collect(),
        excluded: outcome.exclusion.removed.clone(),
        generated: outcome.generated.len(),
        jittered: outcome.jittered.len(),
        parse_failures: outcome.report.parse_failures,
        generation_failures: outcome.report.generation_failures,
        format_warnings: outcome.report.format_warnings,
        output_dir,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize run output: {}", e))?
    );
    Ok(())
}

fn run_jitter_command(args: JitterArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    config.validate()?;
    let schema = QuestionSchema::load(&args.schema)?;
    let seed = args.seed.or(config.seed);

    let written = jitter_file(&schema, &args.input, &args.output, config.jitter.clone(), seed)?;
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        written,
        "Jitter stage complete"
    );
    Ok(())
}

fn run_schema_command(args: SchemaArgs) -> anyhow::Result<()> {
    let schema = QuestionSchema::load(&args.schema)?;
    println!("{}", describe_schema(&schema));
    Ok(())
}

/// One line per question plus a count per kind.
fn describe_schema(schema: &QuestionSchema) -> String {
    let mut lines = Vec::with_capacity(schema.len() + 1);
    let count = |kind: QuestionKind| schema.questions().iter().filter(|q| q.kind == kind).count();
    lines.push(format!(
        "{} questions: {} single, {} multiple, {} matrix_7, {} other",
        schema.len(),
        count(QuestionKind::SingleChoice),
        count(QuestionKind::MultiChoice),
        count(QuestionKind::Scale7),
        count(QuestionKind::Other),
    ));
    for question in schema.questions() {
        let letters = schema.allowed_letters(question.number);
        let detail = if letters.is_empty() {
            String::new()
        } else {
            format!(" [{}]", letters.join(","))
        };
        lines.push(format!(
            "{:>3}  {:<8} {}{}",
            question.number,
            question.kind.to_string(),
            question.column_label,
            detail
        ));
    }
    lines.join("\n")
}
