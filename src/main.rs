// SPDX-License-Identifier: MIT OR Apache-2.0

//! rubric-rag - Retrieval over a grading rubric
//!
//! Ingests rubric line items and grade bands into a local vector index and
//! answers natural-language questions against it.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use commands::AppContext;
use rubric_rag::config::Config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // RUBRIC_RAG_LOG=debug rubric-rag ingest
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUBRIC_RAG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "rubric-rag", &mut std::io::stdout());
        return Ok(());
    }

    let ctx = AppContext::new(
        Config::load(),
        cli.index,
        cli.collection,
        cli.format,
        cli.compact,
    )?;

    match cli.command {
        Commands::Ingest {
            source,
            no_progress,
        } => commands::ingest(&ctx, source, no_progress)?,
        Commands::Query { text, limit } => commands::query(&ctx, &text, limit)?,
        Commands::Demo { limit } => commands::demo(&ctx, limit)?,
        Commands::Info => commands::info(&ctx)?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
