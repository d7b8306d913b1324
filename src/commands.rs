// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command handlers for the rubric-rag binary

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::OutputFormat;
use rubric_rag::config::Config;
use rubric_rag::embedding::{create_provider, CollectionInfo, SqliteIndex, VectorIndex};
use rubric_rag::indexer::{IngestPipeline, IngestReport};
use rubric_rag::output::{
    colorize_dim, colorize_grade, colorize_heading, colorize_score, colorize_section, print_json,
    use_colors,
};
use rubric_rag::query::{DisplayResult, QueryEngine};
use rubric_rag::rubric::SqliteSource;
use rubric_rag::utils::{get_root_with_data, truncate_chars};

const RULE_WIDTH: usize = 70;
const TEXT_PREVIEW_CHARS: usize = 400;

/// Settings shared by every command after merging CLI flags over config.
pub struct AppContext {
    pub config: Config,
    pub index_path: PathBuf,
    pub collection: String,
    pub json: bool,
    pub compact: bool,
}

impl AppContext {
    pub fn new(
        config: Config,
        index: Option<PathBuf>,
        collection: Option<String>,
        format: Option<OutputFormat>,
        compact: bool,
    ) -> Result<Self> {
        let index_path = match index {
            Some(path) => path,
            None => {
                let cwd = std::env::current_dir().context("Cannot determine current directory")?;
                config.index.path(&get_root_with_data(cwd))
            }
        };
        let collection = collection.unwrap_or_else(|| config.index.collection().to_string());
        let json = match format {
            Some(format) => format == OutputFormat::Json,
            None => config.prefers_json(),
        };
        Ok(Self {
            config,
            index_path,
            collection,
            json,
            compact,
        })
    }

    /// Opens an index that must already exist.
    fn open_existing_index(&self) -> Result<SqliteIndex> {
        if !self.index_path.exists() {
            bail!(
                "No index found at {}. Run 'rubric-rag ingest' first.",
                self.index_path.display()
            );
        }
        self.open_index()
    }

    fn open_index(&self) -> Result<SqliteIndex> {
        SqliteIndex::open(
            &self.index_path,
            &self.collection,
            &self.config.index.collection_options(),
        )
        .with_context(|| format!("Failed to open index {}", self.index_path.display()))
    }
}

#[derive(Debug, Serialize)]
struct IngestOutput<'a> {
    index: &'a Path,
    collection: &'a str,
    #[serde(flatten)]
    report: &'a IngestReport,
    total_records: usize,
}

#[derive(Debug, Serialize)]
struct QueryOutput<'a> {
    query: &'a str,
    results: &'a [DisplayResult],
}

#[derive(Debug, Serialize)]
struct InfoOutput<'a> {
    index: &'a Path,
    #[serde(flatten)]
    collection: &'a CollectionInfo,
    count: usize,
}

/// Run the ingest command
pub fn ingest(ctx: &AppContext, source: Option<PathBuf>, no_progress: bool) -> Result<()> {
    let source_path = source.unwrap_or_else(|| ctx.config.source.path());
    let source = SqliteSource::open(&source_path, ctx.config.source.layout())
        .with_context(|| format!("Cannot read rubric source {}", source_path.display()))?;

    let mut provider = create_provider(&ctx.config.embeddings)
        .context("Failed to initialize embedding provider")?;
    let mut index = ctx.open_index()?;

    let show_progress = !no_progress && !ctx.json;
    let report = IngestPipeline::new(provider.as_mut(), &mut index)
        .with_builder(ctx.config.source.record_builder())
        .with_progress(show_progress)
        .ingest(&source)
        .context("Ingestion failed")?;
    let total_records = index.count()?;

    if ctx.json {
        return print_json(
            &IngestOutput {
                index: &ctx.index_path,
                collection: &ctx.collection,
                report: &report,
                total_records,
            },
            ctx.compact,
        );
    }

    println!(
        "{} Ingested {} records into '{}' ({} skipped, {} total)",
        "✓".green(),
        report.accepted_count.to_string().cyan(),
        ctx.collection,
        report.skipped_count.to_string().dimmed(),
        total_records
    );
    for (reason, count) in &report.skipped_by_reason {
        println!("  {} {}", count, colorize_dim(&reason.to_string(), use_colors()));
    }
    Ok(())
}

/// Run the query command
pub fn query(ctx: &AppContext, text: &str, limit: Option<usize>) -> Result<()> {
    let top_k = limit.unwrap_or_else(|| ctx.config.query.top_k());
    let index = ctx.open_existing_index()?;
    let mut provider = create_provider(&ctx.config.embeddings)
        .context("Failed to initialize embedding provider")?;
    let mut engine = QueryEngine::new(provider.as_mut(), &index);

    let results = engine.query(text, top_k)?;
    if ctx.json {
        return print_json(
            &QueryOutput {
                query: text,
                results: &results,
            },
            ctx.compact,
        );
    }

    print_results(text, &results);
    Ok(())
}

/// Run the demo command: the fixed example questions, one after another
pub fn demo(ctx: &AppContext, limit: Option<usize>) -> Result<()> {
    let top_k = limit.unwrap_or_else(|| ctx.config.query.demo_top_k());
    let index = ctx.open_existing_index()?;
    let mut provider = create_provider(&ctx.config.embeddings)
        .context("Failed to initialize embedding provider")?;
    let mut engine = QueryEngine::new(provider.as_mut(), &index);
    let queries = ctx.config.query.demo_queries();

    if ctx.json {
        let mut outputs = Vec::with_capacity(queries.len());
        for q in &queries {
            outputs.push((q.as_str(), engine.query(q, top_k)?));
        }
        let payload: Vec<QueryOutput<'_>> = outputs
            .iter()
            .map(|(query, results)| QueryOutput {
                query: *query,
                results: results.as_slice(),
            })
            .collect();
        return print_json(&payload, ctx.compact);
    }

    let rule = "=".repeat(RULE_WIDTH);
    println!("{}", rule);
    println!("{}", colorize_heading("ThriveMap Rubric RAG System", use_colors()));
    println!("{}", rule);
    for q in &queries {
        let results = engine.query(q, top_k)?;
        println!("\n{}", rule);
        print_results(q, &results);
    }
    Ok(())
}

/// Run the info command
pub fn info(ctx: &AppContext) -> Result<()> {
    let index = ctx.open_existing_index()?;
    let count = index.count()?;
    let collection = index.collection();

    if ctx.json {
        return print_json(
            &InfoOutput {
                index: &ctx.index_path,
                collection,
                count,
            },
            ctx.compact,
        );
    }

    println!("Index:       {}", ctx.index_path.display());
    println!("Collection:  {} ({})", collection.name, collection.description);
    println!("Records:     {}", count);
    println!("Metric:      {}", collection.metric);
    println!(
        "Dimension:   {}",
        collection
            .dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Model:       {}",
        collection.model_id.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn print_results(query: &str, results: &[DisplayResult]) {
    let use_color = use_colors();
    println!("Query: {}", query);
    if results.is_empty() {
        println!("{} No results (index is empty)", "✗".red());
        return;
    }

    for result in results {
        let score = match result.similarity {
            Some(similarity) => format!("similarity: {}", colorize_score(similarity, use_color)),
            None => format!("distance: {}", colorize_score(result.distance, use_color)),
        };
        println!(
            "\n{} ({}) {}",
            colorize_heading(&format!("Result {}", result.rank), use_color),
            score,
            colorize_dim(&result.id, use_color)
        );
        println!("  Text: {}", truncate_chars(&result.text, TEXT_PREVIEW_CHARS));
        if let Some(section) = result.section_code() {
            println!("  Section: {}", colorize_section(section, use_color));
        }
        if let Some(points) = result.points() {
            println!("  Points: {}", points);
        }
        if result.is_grading_map() {
            println!("  {}", colorize_grade("Grading map entry", use_color));
        }
    }
}
