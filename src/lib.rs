// SPDX-License-Identifier: MIT OR Apache-2.0

//! rubric-rag - Retrieval over a grading rubric
//!
//! Reads rubric line items and the grading map from SQLite, embeds them into
//! a persistent vector index, and answers natural-language questions with the
//! closest rubric entries.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod indexer;
pub mod output;
pub mod query;
pub mod rubric;
pub mod utils;

pub use errors::{RagError, Result};
