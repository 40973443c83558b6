//! Command-line interface for caseminer.
//!
//! A thin wrapper over the library: reads a document from a text file (or
//! stdin), runs the extraction pipeline, and writes records to a JSONL sink.
//! The web/API layer lives elsewhere and uses the library directly.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::domain::Document;
use crate::ontology::Ontology;
use crate::pipeline::{ExtractionPipeline, JsonlSink};

/// caseminer - structured patient-record extraction from biomedical text
#[derive(Parser, Debug)]
#[command(name = "caseminer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the YAML config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract patient records from a document
    Extract {
        /// Input text file (reads from stdin if not provided)
        input: Option<PathBuf>,

        /// Where to append extracted records as JSONL
        #[arg(short, long, default_value = "records.jsonl")]
        output: PathBuf,

        /// Enable the recall-focused second extraction pass
        #[arg(long)]
        two_pass: bool,
    },

    /// Show provider health and remaining quota
    Providers,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::from_yaml("{}")?,
        };

        match self.command {
            Commands::Extract {
                input,
                output,
                two_pass,
            } => extract(config, input, output, two_pass).await,
            Commands::Providers => providers(config),
        }
    }
}

async fn extract(
    mut config: Config,
    input: Option<PathBuf>,
    output: PathBuf,
    two_pass: bool,
) -> Result<()> {
    if two_pass {
        config.orchestrator.two_pass = true;
    }

    let text = match &input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            buf
        }
    };

    let mut document = Document::new(text);
    if let Some(path) = input {
        document = document.with_source_path(path);
    }

    let pipeline = build_pipeline(&config)?.with_sink(Arc::new(JsonlSink::new(output.clone())));
    let records = pipeline.extract_document(&document).await?;

    println!(
        "extracted {} patient record(s) from document {}",
        records.len(),
        document.id
    );
    for record in &records {
        println!(
            "  segment {}: {} field(s), overall confidence {:.2}",
            record.segment_id,
            record.fields.len(),
            record.overall_confidence
        );
        for note in &record.notes {
            println!("    note: {note}");
        }
    }
    println!("records appended to {}", output.display());
    Ok(())
}

fn providers(config: Config) -> Result<()> {
    let pool = config.build_pool()?;
    let pipeline = ExtractionPipeline::new(Arc::new(pool), config.orchestrator.clone());
    for status in pipeline.status().providers {
        let quota = status
            .remaining_quota
            .map(|q| q.to_string())
            .unwrap_or_else(|| "unlimited".to_string());
        println!(
            "{}: {:?}, {} request(s) this window, remaining quota {}",
            status.provider_name, status.health, status.requests_in_window, quota
        );
    }
    Ok(())
}

fn build_pipeline(config: &Config) -> Result<ExtractionPipeline> {
    let pool = Arc::new(config.build_pool()?);

    let phenotype = match &config.ontologies.phenotype {
        Some(path) => Arc::new(Ontology::from_json_file("hpo", path)?),
        None => Arc::new(Ontology::empty("hpo")),
    };
    let gene = match &config.ontologies.gene {
        Some(path) => Arc::new(Ontology::from_json_file("genes", path)?),
        None => Arc::new(Ontology::empty("genes")),
    };

    Ok(ExtractionPipeline::new(pool, config.orchestrator.clone())
        .with_segmenter(crate::segmenter::Segmenter::new(config.segmenter.clone()))
        .with_normalizer(crate::ontology::Normalizer::new(config.normalizer.clone()))
        .with_ontologies(phenotype, gene))
}
