// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query engine: question text -> ranked rubric entries.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::embedding::{DistanceMetric, EmbeddingProvider, IndexHit, VectorIndex};
use crate::errors::{RagError, Result};
use crate::rubric::GRADING_MAP_TYPE;

/// A ranked, display-ready query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayResult {
    /// 1-based position in the result list
    pub rank: usize,
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    /// Raw distance reported by the index (lower is closer)
    pub distance: f32,
    /// `1 - distance`; only defined for cosine collections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
}

impl DisplayResult {
    fn from_hit(rank: usize, hit: IndexHit, metric: DistanceMetric) -> Self {
        let similarity = match metric {
            DistanceMetric::Cosine => Some(1.0 - hit.distance),
            DistanceMetric::L2 | DistanceMetric::Ip => None,
        };
        Self {
            rank,
            id: hit.id,
            text: hit.text,
            metadata: hit.metadata,
            distance: hit.distance,
            similarity,
        }
    }

    /// Section code, when present and non-empty.
    pub fn section_code(&self) -> Option<&str> {
        self.non_empty("section_code")
    }

    /// Points, when present and non-empty.
    pub fn points(&self) -> Option<&str> {
        self.non_empty("points")
    }

    /// Whether this result came from the grading map.
    pub fn is_grading_map(&self) -> bool {
        self.metadata.get("type").map(String::as_str) == Some(GRADING_MAP_TYPE)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }
}

/// Embeds questions and looks them up in an already populated index.
pub struct QueryEngine<'a> {
    provider: &'a mut dyn EmbeddingProvider,
    index: &'a dyn VectorIndex,
}

impl<'a> QueryEngine<'a> {
    /// Creates an engine. Warns when the provider differs from the model
    /// that populated the index; distances across models are meaningless.
    pub fn new(provider: &'a mut dyn EmbeddingProvider, index: &'a dyn VectorIndex) -> Self {
        if let Some(stored) = index.model_id() {
            if stored != provider.model_id() {
                tracing::warn!(
                    "index was built with model {} but queries use {}",
                    stored,
                    provider.model_id()
                );
            }
        }
        Self { provider, index }
    }

    /// Returns the `top_k` entries closest to `query_text`, closest first.
    ///
    /// Fewer than `top_k` results come back when the index holds fewer
    /// records.
    pub fn query(&mut self, query_text: &str, top_k: usize) -> Result<Vec<DisplayResult>> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument(
                "top_k must be at least 1".to_string(),
            ));
        }
        if query_text.trim().is_empty() {
            return Err(RagError::InvalidArgument(
                "query text must not be empty".to_string(),
            ));
        }

        let embedding = self
            .provider
            .embed_one(query_text)
            .map_err(RagError::embedding)?;
        if embedding.is_empty() || embedding.iter().any(|v| !v.is_finite()) {
            return Err(RagError::EmbeddingFailure(
                "provider returned an unusable query vector".to_string(),
            ));
        }

        let hits = self.index.query(&embedding, top_k)?;
        tracing::debug!("query {:?} matched {} records", query_text, hits.len());

        let metric = self.index.metric();
        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, hit)| DisplayResult::from_hit(i + 1, hit, metric))
            .collect())
    }
}
