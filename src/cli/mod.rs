//! Command-line interface for makercheck.
//!
//! Provides commands for running a guarded pipeline over a query,
//! inspecting persisted audit trails, and showing resolved
//! configuration.

use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{
    HttpModelBackend, HttpSearchRetriever, ModelBackend, Retriever, StaticRetriever,
    SubprocessModelBackend,
};
use crate::agents::{ModelChecker, ModelMaker};
use crate::config::{self, ResolvedConfig};
use crate::core::{Orchestrator, TrailStore};
use crate::domain::{ContextPassage, PipelineRecord, PipelineResult, StageEntry, VerdictSnapshot};
use crate::guards::{
    ClassifierInputGuard, ClassifierOutputGuard, LexicalClassifier, ModelClassifier,
    SafetyClassifier,
};

/// makercheck - Guarded Maker-Checker orchestrator for RAG queries
#[derive(Parser, Debug)]
#[command(name = "makercheck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a query through the guarded pipeline
    Ask {
        /// The query (reads from stdin if not provided)
        query: Option<String>,

        /// Read the query from a file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Dump the sealed audit trail as JSON after the answer
        #[arg(long)]
        trace: bool,

        /// Use only local capabilities: static retriever, lexical
        /// classifiers, subprocess model
        #[arg(long)]
        offline: bool,
    },

    /// Show a persisted audit trail
    Show {
        /// Run ID (UUID)
        run_id: String,

        /// Include input/output snapshots per stage
        #[arg(short, long)]
        full: bool,
    },

    /// List persisted runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let cfg = config::load()?;

        match self.command {
            Commands::Ask {
                query,
                input,
                trace,
                offline,
            } => ask(&cfg, query, input, trace, offline).await,
            Commands::Show { run_id, full } => show(&cfg, &run_id, full).await,
            Commands::Runs { limit } => list_runs(&cfg, limit).await,
            Commands::Config => {
                println!("{:#?}", cfg);
                Ok(())
            }
        }
    }
}

async fn ask(
    cfg: &ResolvedConfig,
    query: Option<String>,
    input: Option<PathBuf>,
    trace: bool,
    offline: bool,
) -> Result<()> {
    let query = read_query(query, input)?;
    if query.is_empty() {
        bail!("empty query");
    }

    let orchestrator = build_orchestrator(cfg, offline)?;
    let result = orchestrator.run(&query).await;

    let store = TrailStore::new(cfg.runs_dir());
    let path = store.save(result.record()).await?;
    tracing::info!(run_id = %result.record().run_id, trail = %path.display(), "trail persisted");

    println!("{}", result.user_message());

    if trace {
        println!("{}", serde_json::to_string_pretty(result.record())?);
    }

    match result {
        PipelineResult::Answered { .. } => Ok(()),
        PipelineResult::Rejected { .. } => std::process::exit(2),
        PipelineResult::Failed { .. } => std::process::exit(3),
    }
}

/// Wire concrete backends per configuration. Offline mode uses only
/// local capabilities; online mode fronts the configured HTTP services
/// with model-backed classifiers.
fn build_orchestrator(cfg: &ResolvedConfig, offline: bool) -> Result<Orchestrator> {
    let pipeline = cfg.pipeline.clone();

    let model: Arc<dyn ModelBackend> = if !offline && cfg.backends.model_url.is_some() {
        let url = cfg.backends.model_url.clone().unwrap_or_default();
        let mut backend = HttpModelBackend::new(url);
        if let Some(ref name) = cfg.backends.model_name {
            backend = backend.with_model(name.clone());
        }
        if let Some(ref key) = cfg.api_key {
            backend = backend.with_api_key(key.clone());
        }
        Arc::new(backend)
    } else if let Some(ref binary) = cfg.backends.model_binary {
        Arc::new(
            SubprocessModelBackend::new(binary.clone(), pipeline.stage_timeout())
                .with_args(cfg.backends.model_args.clone()),
        )
    } else {
        bail!(
            "no model backend configured; set backends.model_url or \
             backends.model_binary in .makercheck/config.yaml"
        );
    };

    let retriever: Arc<dyn Retriever> = if offline || cfg.backends.search_url.is_none() {
        let corpus = load_corpus(cfg)?;
        Arc::new(StaticRetriever::new(corpus, pipeline.top_k))
    } else {
        let url = cfg.backends.search_url.clone().unwrap_or_default();
        Arc::new(HttpSearchRetriever::new(url, pipeline.top_k))
    };

    let (input_classifier, output_classifier): (Arc<dyn SafetyClassifier>, Arc<dyn SafetyClassifier>) =
        if offline {
            (
                Arc::new(LexicalClassifier::for_input()),
                Arc::new(LexicalClassifier::for_output()),
            )
        } else {
            (
                Arc::new(ModelClassifier::for_input(model.clone())),
                Arc::new(ModelClassifier::for_output(model.clone())),
            )
        };

    Ok(Orchestrator::new(
        Arc::new(ClassifierInputGuard::new(
            input_classifier,
            pipeline.irrelevance_blocks,
        )),
        retriever,
        Arc::new(ModelMaker::new(model.clone())),
        Arc::new(ModelChecker::new(model)),
        Arc::new(ClassifierOutputGuard::new(output_classifier)),
        pipeline,
    ))
}

fn load_corpus(cfg: &ResolvedConfig) -> Result<Vec<ContextPassage>> {
    match &cfg.backends.corpus_file {
        None => Ok(Vec::new()),
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read corpus file: {}", path))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse corpus file: {}", path))
        }
    }
}

fn read_query(query: Option<String>, input: Option<PathBuf>) -> Result<String> {
    let raw = if let Some(query) = query {
        query
    } else if let Some(path) = input {
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read query file: {}", path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read query from stdin")?;
        buffer
    };

    Ok(raw.trim().to_string())
}

async fn show(cfg: &ResolvedConfig, run_id: &str, full: bool) -> Result<()> {
    let run_id = Uuid::parse_str(run_id).context("invalid run id")?;
    let store = TrailStore::new(cfg.runs_dir());
    let record = store.load(run_id).await?;

    print_record(&record, full);
    Ok(())
}

fn print_record(record: &PipelineRecord, full: bool) {
    println!("run      {}", record.run_id);
    println!("query    {}", record.query_snapshot);
    println!("started  {}", record.started_at);
    if let Some(outcome) = record.outcome {
        println!("outcome  {:?}", outcome);
    }
    println!();

    for entry in &record.entries {
        println!("{}", format_entry(entry));
        if full {
            println!("    in:  {}", entry.input_snapshot);
            println!("    out: {}", entry.output_snapshot);
        }
    }
}

fn format_entry(entry: &StageEntry) -> String {
    let verdict = match &entry.verdict {
        Some(VerdictSnapshot::Safety(v)) => {
            if v.passed {
                "pass".to_string()
            } else {
                format!("blocked ({})", v.categories())
            }
        }
        Some(VerdictSnapshot::Audit(v)) => {
            if v.accepted {
                "accepted".to_string()
            } else {
                format!("rejected: {}", v.feedback)
            }
        }
        None => String::new(),
    };

    let mut line = format!(
        "{}  {:<12} #{}",
        entry.timestamp.format("%H:%M:%S%.3f"),
        entry.stage.to_string(),
        entry.attempt
    );
    if let Some(ms) = entry.duration_ms {
        line.push_str(&format!("  {}ms", ms));
    }
    if !verdict.is_empty() {
        line.push_str(&format!("  {}", verdict));
    }
    if let Some(ref error) = entry.error {
        line.push_str(&format!("  error: {}", error));
    }
    line
}

async fn list_runs(cfg: &ResolvedConfig, limit: usize) -> Result<()> {
    let store = TrailStore::new(cfg.runs_dir());
    let run_ids = store.list_runs().await?;

    let mut records = Vec::new();
    for run_id in run_ids {
        if let Ok(record) = store.load(run_id).await {
            records.push(record);
        }
    }

    // Most recent first.
    records.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    for record in records.into_iter().take(limit) {
        let outcome = record
            .outcome
            .map(|o| format!("{:?}", o))
            .unwrap_or_default();
        println!(
            "{}  {}  {}  {}",
            record.run_id,
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            outcome,
            record.query_snapshot
        );
    }

    Ok(())
}
