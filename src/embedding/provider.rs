// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! The builtin provider runs sentence-transformers/all-MiniLM-L6-v2 locally
//! through fastembed. The same provider must be used for ingestion and for
//! queries; vectors from different models are not comparable.

use anyhow::{bail, Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::Deserialize;
use std::io::Write;
use std::process::{Command, Stdio};

use crate::config::{EmbeddingConfig, EmbeddingProviderType};

const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_COMMAND_BATCH_SIZE: usize = 64;
const DEFAULT_HASH_BATCH_SIZE: usize = 256;

/// Embedding dimension of sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Settings for the fastembed provider, taken from `[embeddings]`.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let batch_size = config.batch_size().unwrap_or(256);
        if batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                "batch_size {} is above {}, using {}",
                batch_size,
                MAX_FASTEMBED_BATCH_SIZE,
                MAX_FASTEMBED_BATCH_SIZE
            );
        }
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: batch_size.min(MAX_FASTEMBED_BATCH_SIZE),
            max_chars: config.max_chars(),
            normalize: config.normalize(),
        }
    }
}

/// Trait for embedding providers.
///
/// Implementations must return exactly one vector per input text, in input
/// order, all of the same dimension.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates embeddings for the given texts.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        if result.len() != 1 {
            bail!("Expected 1 embedding, provider returned {}", result.len());
        }
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// Builds the provider selected in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Builtin => Box::new(FastEmbedder::new(
            EmbeddingProviderConfig::from_config(config),
        )?),
        EmbeddingProviderType::Command => Box::new(
            CommandProvider::new(config.command(), config.model())
                .with_batch_size(config.batch_size().unwrap_or(DEFAULT_COMMAND_BATCH_SIZE)),
        ),
        EmbeddingProviderType::Hash => Box::new(
            HashEmbedder::new(config.dimension())
                .with_batch_size(config.batch_size().unwrap_or(DEFAULT_HASH_BATCH_SIZE)),
        ),
    };
    Ok(provider)
}

/// Checks a provider response against the batch it was asked to embed and
/// returns the common dimension.
pub fn validate_batch(expected: usize, vectors: &[Vec<f32>]) -> Result<usize> {
    if vectors.len() != expected {
        bail!(
            "provider returned {} vectors for {} texts",
            vectors.len(),
            expected
        );
    }
    let Some(first) = vectors.first() else {
        return Ok(0);
    };
    let dimension = first.len();
    if dimension == 0 {
        bail!("provider returned an empty vector");
    }
    if let Some(pos) = vectors.iter().position(|v| v.len() != dimension) {
        bail!(
            "provider returned mixed dimensions ({} at position 0, {} at position {})",
            dimension,
            vectors[pos].len(),
            pos
        );
    }
    if vectors.iter().flatten().any(|v| !v.is_finite()) {
        bail!("provider returned non-finite values");
    }
    Ok(dimension)
}

/// FastEmbed provider using sentence-transformers/all-MiniLM-L6-v2.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder,
            config,
            model_id,
        })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared: Vec<&str> = texts
            .iter()
            .map(|text| truncate_to_chars(text, self.config.max_chars))
            .collect();
        let mut embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))
            .context("fastembed inference failed")?;

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

/// Runs a shell command per batch.
///
/// The command gets `{"model": ..., "texts": [...]}` on stdin and must print
/// the vectors as JSON: a bare array, or an object holding the array under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

#[derive(serde::Serialize)]
struct CommandRequest<'a> {
    model: &'a str,
    texts: &'a [String],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommandResponse {
    Bare(Vec<Vec<f32>>),
    Wrapped {
        #[serde(alias = "vectors", alias = "data")]
        embeddings: Vec<Vec<f32>>,
    },
}

impl CommandProvider {
    pub fn new(command: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
            batch_size: DEFAULT_COMMAND_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = serde_json::to_vec(&CommandRequest {
            model: &self.model,
            texts,
        })?;

        let mut child = Command::new("sh")
            .args(["-c", &self.command])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("cannot start embedding command `{}`", self.command))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&request)
                .context("cannot send texts to embedding command")?;
        }
        let output = child
            .wait_with_output()
            .context("embedding command did not finish")?;

        if !output.status.success() {
            bail!(
                "embedding command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        parse_command_output(&output.stdout)
    }
}

fn parse_command_output(stdout: &[u8]) -> Result<Vec<Vec<f32>>> {
    let response: CommandResponse = serde_json::from_slice(stdout)
        .context("embedding command must print a JSON array of vectors")?;
    match response {
        CommandResponse::Bare(vectors) => Ok(vectors),
        CommandResponse::Wrapped { embeddings } => Ok(embeddings),
    }
}

/// Deterministic bag-of-tokens embedder.
///
/// Each lowercase alphanumeric token is hashed with blake3 into one of
/// `dimension` buckets; the counts are L2-normalized. Texts sharing tokens
/// get positive cosine similarity, so it doubles as an offline stand-in for
/// a real model.
pub struct HashEmbedder {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            model: format!("hash-{}", dimension),
            dimension,
            batch_size: DEFAULT_HASH_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&hash.as_bytes()[..8]);
            let bucket = (u64::from_le_bytes(bytes) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Keeps at most `max_chars` characters.
fn truncate_to_chars(text: &str, max_chars: usize) -> &str {
    text.char_indices()
        .nth(max_chars)
        .map_or(text, |(end, _)| &text[..end])
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
