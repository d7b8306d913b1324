// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - providers and the vector index
//!
//! Providers turn text into vectors; the index stores those vectors next to
//! their records and answers nearest-neighbor queries.

pub mod provider;
pub mod storage;

pub use provider::{
    create_provider, validate_batch, CommandProvider, EmbeddingProvider, EmbeddingProviderConfig,
    FastEmbedder, HashEmbedder, DEFAULT_EMBEDDING_DIM,
};
pub use storage::{
    CollectionInfo, CollectionOptions, DistanceMetric, IndexEntry, IndexHit, SqliteIndex,
    StoredRecord, VectorIndex, DEFAULT_COLLECTION, DEFAULT_COLLECTION_DESCRIPTION,
};
