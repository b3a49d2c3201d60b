//! srlx CLI - Command-line interface
//!
//! Usage:
//!   srlx extract --annotations <file> [text]
//!   srlx run --input <path> --annotations <file> [--workers N] [--schema ID] [--dry-run]
//!   srlx schemas

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use srlx_core::{AppConfig, LoggingConfig};
use srlx_extractor::{DefaultAnalyzer, PrecomputedAnnotator, RelationFormer};
use srlx_pipeline::{ExtractionPipeline, FileSource};
use srlx_sink::{build_store, IndexStore, MemoryStore, SchemaRegistry, SinkSet};

#[derive(Parser)]
#[command(name = "srlx")]
#[command(about = "SRL-driven relation extraction pipeline")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "SRLX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract relations from text and print them as JSON lines
    Extract {
        /// Precomputed SRL annotations (JSON)
        #[arg(long)]
        annotations: PathBuf,
        /// Text to extract from; read from stdin when omitted
        text: Option<String>,
    },
    /// Run the extraction pipeline over a file or directory
    Run {
        /// Input file or directory
        #[arg(long)]
        input: PathBuf,
        /// Precomputed SRL annotations (JSON)
        #[arg(long)]
        annotations: PathBuf,
        /// Number of extraction workers
        #[arg(long)]
        workers: Option<usize>,
        /// Target schema, as index.mapping
        #[arg(long, default_value = "relation.faq")]
        schema: String,
        /// Persist into memory instead of the configured store
        #[arg(long)]
        dry_run: bool,
    },
    /// List registered schemas
    Schemas,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config)?;
    init_logging(&config.logging);

    match cli.command {
        Commands::Extract { annotations, text } => extract(annotations, text),
        Commands::Run {
            input,
            annotations,
            workers,
            schema,
            dry_run,
        } => run(config, input, annotations, workers, &schema, dry_run).await,
        Commands::Schemas => {
            for schema in SchemaRegistry::with_defaults().iter() {
                let fields: Vec<&str> = schema
                    .schema()
                    .fields
                    .iter()
                    .map(|field| field.name.as_str())
                    .collect();
                println!("{}  [{}]", schema.id(), fields.join(", "));
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &logging.level;
        format!("srlx_cli={level},srlx_pipeline={level},srlx_sink={level},srlx_extractor={level}")
            .into()
    });

    if logging.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn relation_former(annotations: &Path) -> anyhow::Result<RelationFormer> {
    let annotator = PrecomputedAnnotator::from_file(annotations)?;
    info!(sentences = annotator.len(), "loaded annotations");

    let analyzer = DefaultAnalyzer::new()?;
    Ok(RelationFormer::new(Arc::new(annotator), Arc::new(analyzer)))
}

fn extract(annotations: PathBuf, text: Option<String>) -> anyhow::Result<()> {
    let former = relation_former(&annotations)?;

    let text = match text {
        Some(text) => text,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read text from stdin")?;
            buffer
        }
    };

    for record in former.form_relations(&text)? {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

async fn run(
    mut config: AppConfig,
    input: PathBuf,
    annotations: PathBuf,
    workers: Option<usize>,
    schema: &str,
    dry_run: bool,
) -> anyhow::Result<()> {
    if let Some(workers) = workers {
        config.pipeline.workers = workers;
    }
    config.validate()?;

    let former = relation_former(&annotations)?;

    let memory = dry_run.then(|| Arc::new(MemoryStore::new()));
    let store: Arc<dyn IndexStore> = match &memory {
        Some(memory) => memory.clone(),
        None => build_store(&config.store)?,
    };

    let registry = SchemaRegistry::with_defaults();
    let sinks = SinkSet::form(&registry, store, &config.sink);
    let sink = sinks.by_name(schema)?;

    let mut pipeline = ExtractionPipeline::new(Arc::new(former), config.pipeline.clone())
        .with_source(Arc::new(FileSource::new(input)))
        .with_sink(sink.clone());

    let outcome = tokio::select! {
        outcome = pipeline.run() => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, stopping sinks");
            sinks.close_all().await?;
            return Ok(());
        }
    };
    sinks.close_all().await?;
    let report = outcome?;

    println!("{report}");
    let stats = sink.stats();
    println!(
        "Sink {}: {} persisted, {} failed, {} cancelled",
        sink.name(),
        stats.persisted,
        stats.failed,
        stats.cancelled
    );
    if let Some(memory) = memory {
        println!("Dry run: {} documents kept in memory", memory.total());
    }
    Ok(())
}
