// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// rubric-rag - Retrieval over a grading rubric
///
/// Loads rubric questions and the grade map from SQLite into a local vector
/// index and answers natural-language questions about them.
#[derive(Parser, Debug)]
#[command(name = "rubric-rag")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Index database file (overrides config)
    #[arg(long, global = true)]
    pub index: Option<PathBuf>,

    /// Collection name (overrides config)
    #[arg(long, global = true)]
    pub collection: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load the rubric tables into the vector index
    #[command(alias = "i")]
    Ingest {
        /// SQLite database with the rubric tables
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Hide the embedding progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Ask a question about the rubric
    #[command(alias = "q")]
    Query {
        /// Question text
        text: String,

        /// Number of results (default: 5)
        #[arg(short = 'm', long = "limit")]
        limit: Option<usize>,
    },

    /// Run the built-in example questions
    Demo {
        /// Results per question (default: 3)
        #[arg(short = 'm', long = "limit")]
        limit: Option<usize>,
    },

    /// Show collection details
    Info,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
