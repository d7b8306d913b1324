// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingestion pipeline: source rows -> records -> embeddings -> index
//!
//! Nothing is written to the index until every accepted record has a
//! vector, so a failing source read or embedding batch leaves the index
//! untouched.

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info};

use crate::embedding::{validate_batch, EmbeddingProvider, IndexEntry, VectorIndex};
use crate::errors::{RagError, Result};
use crate::rubric::{BuildOutcome, RecordBuilder, RowSource, SkipReason, SourceRow, VectorRecord};

/// Counts produced by one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub accepted_count: usize,
    pub skipped_count: usize,
    /// Skips broken down by reason
    pub skipped_by_reason: BTreeMap<SkipReason, usize>,
}

impl IngestReport {
    /// Total rows read from the source.
    pub fn scanned(&self) -> usize {
        self.accepted_count + self.skipped_count
    }
}

/// Orchestrates one ingestion run against injected provider and index.
pub struct IngestPipeline<'a> {
    provider: &'a mut dyn EmbeddingProvider,
    index: &'a mut dyn VectorIndex,
    builder: RecordBuilder,
    show_progress: bool,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(provider: &'a mut dyn EmbeddingProvider, index: &'a mut dyn VectorIndex) -> Self {
        Self {
            provider,
            index,
            builder: RecordBuilder::default(),
            show_progress: false,
        }
    }

    /// Use a builder with non-default marker/header settings.
    pub fn with_builder(mut self, builder: RecordBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// Show an embedding progress bar on stderr.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Reads every source row, embeds accepted records and upserts them.
    pub fn ingest(&mut self, source: &dyn RowSource) -> Result<IngestReport> {
        let rows = source.read_rows()?;
        let (records, report) = self.build_records(&rows)?;

        if records.is_empty() {
            info!("no records to ingest ({} rows skipped)", report.skipped_count);
            return Ok(report);
        }

        let vectors = self.embed_records(&records)?;

        let entries: Vec<IndexEntry<'_>> = records
            .iter()
            .zip(vectors.iter())
            .map(|(record, embedding)| IndexEntry {
                record,
                embedding: embedding.as_slice(),
            })
            .collect();

        self.index.upsert(&entries, self.provider.model_id())?;

        info!(
            "ingested {} records ({} rows skipped, model {})",
            report.accepted_count,
            report.skipped_count,
            self.provider.model_id()
        );
        Ok(report)
    }

    fn build_records(&self, rows: &[SourceRow]) -> Result<(Vec<VectorRecord>, IngestReport)> {
        let mut report = IngestReport::default();
        let mut records = Vec::with_capacity(rows.len());
        let mut seen = HashSet::with_capacity(rows.len());

        for row in rows {
            match self.builder.build(row) {
                BuildOutcome::Accepted(record) => {
                    if !seen.insert(record.id.clone()) {
                        return Err(RagError::InvalidArgument(format!(
                            "duplicate record id {}",
                            record.id
                        )));
                    }
                    report.accepted_count += 1;
                    records.push(record);
                }
                BuildOutcome::Skipped(reason) => {
                    debug!("skipping {} ({})", row.record_id(), reason);
                    report.skipped_count += 1;
                    *report.skipped_by_reason.entry(reason).or_insert(0) += 1;
                }
            }
        }

        Ok((records, report))
    }

    /// Embeds record texts batch by batch, keeping positional alignment.
    fn embed_records(&mut self, records: &[VectorRecord]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let batch_size = self.provider.batch_size().max(1);

        let pb = if self.show_progress {
            let pb = ProgressBar::new(texts.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{bar:40.cyan/blue}] {pos}/{len} records | Embedding")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("##."),
            );
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        let mut dimension: Option<usize> = None;

        for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
            let embedded = self
                .provider
                .embed_texts(batch)
                .map_err(RagError::embedding)?;
            let batch_dim = validate_batch(batch.len(), &embedded).map_err(RagError::embedding)?;

            match dimension {
                None => dimension = Some(batch_dim),
                Some(dim) if dim != batch_dim => {
                    return Err(RagError::EmbeddingFailure(format!(
                        "batch {} has dimension {}, earlier batches {}",
                        batch_no, batch_dim, dim
                    )));
                }
                Some(_) => {}
            }

            debug!("embedded batch {} ({} texts)", batch_no, batch.len());
            vectors.extend(embedded);
            pb.inc(batch.len() as u64);
        }

        pb.finish_and_clear();

        if let (Some(expected), Some(actual)) = (self.index.dimension(), dimension) {
            if expected != actual {
                return Err(RagError::DimensionMismatch { expected, actual });
            }
        }

        Ok(vectors)
    }
}
