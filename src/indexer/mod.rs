// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion of the rubric source into the vector index.

pub mod ingest;

pub use ingest::{IngestPipeline, IngestReport};
