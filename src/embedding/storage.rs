// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed vector index for rubric records.
//!
//! A database file holds any number of named collections. Each collection
//! fixes its distance metric when created and its dimension on the first
//! upsert. Search is brute force over every stored vector, which is exact
//! and plenty fast for a rubric-sized corpus.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::errors::{RagError, Result};
use crate::rubric::VectorRecord;

const SCHEMA_VERSION: &str = "1";

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "thrivemap_rubric";
/// Default collection description.
pub const DEFAULT_COLLECTION_DESCRIPTION: &str = "ThriveMap Grading Rubric for RAG";

/// Distance metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in [0, 2]
    #[default]
    Cosine,
    /// Squared euclidean distance
    L2,
    /// `1 - a·b`
    Ip,
}

impl DistanceMetric {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Ip => "ip",
        }
    }

    /// Distance between two vectors of equal length.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            DistanceMetric::Ip => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" => Ok(DistanceMetric::L2),
            "ip" => Ok(DistanceMetric::Ip),
            _ => Err(format!("Unknown distance metric: {}", s)),
        }
    }
}

/// A record paired with its embedding, ready for upsert.
#[derive(Debug, Clone, Copy)]
pub struct IndexEntry<'a> {
    pub record: &'a VectorRecord,
    pub embedding: &'a [f32],
}

/// A nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub distance: f32,
}

/// A record as stored, including its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub record: VectorRecord,
    pub embedding: Vec<f32>,
}

/// Settings applied when a collection is created.
#[derive(Debug, Clone)]
pub struct CollectionOptions {
    pub metric: DistanceMetric,
    pub description: String,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            metric: DistanceMetric::Cosine,
            description: DEFAULT_COLLECTION_DESCRIPTION.to_string(),
        }
    }
}

/// Collection settings as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub description: String,
    pub metric: DistanceMetric,
    pub dimension: Option<usize>,
    pub model_id: Option<String>,
}

/// Upsert/query contract the pipelines depend on.
pub trait VectorIndex {
    /// Inserts or overwrites entries by id and records `model_id` as the
    /// collection's embedding model, all in one transaction.
    fn upsert(&mut self, entries: &[IndexEntry<'_>], model_id: &str) -> Result<()>;

    /// Returns up to `top_k` hits ordered by ascending distance.
    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>>;

    /// Number of stored records.
    fn count(&self) -> Result<usize>;

    fn metric(&self) -> DistanceMetric;

    /// Dimension fixed by the first upsert, if any.
    fn dimension(&self) -> Option<usize>;

    /// Embedding model recorded by the last upsert.
    fn model_id(&self) -> Option<&str>;
}

/// Vector index stored in a SQLite file.
pub struct SqliteIndex {
    conn: Connection,
    collection: CollectionInfo,
}

impl SqliteIndex {
    /// Opens the named collection, creating the database file and the
    /// collection if absent.
    ///
    /// Fails if the collection exists with a different metric.
    pub fn open<P: AsRef<Path>>(path: P, name: &str, options: &CollectionOptions) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    RagError::index_msg(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| RagError::index(format!("Failed to open {}", path.display()), e))?;
        Self::init(conn, name, options)
    }

    /// Opens a throwaway in-memory collection.
    pub fn open_in_memory(name: &str, options: &CollectionOptions) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RagError::index("Failed to open in-memory index", e))?;
        Self::init(conn, name, options)
    }

    fn init(conn: Connection, name: &str, options: &CollectionOptions) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(RagError::InvalidArgument(
                "collection name must not be empty".to_string(),
            ));
        }

        init_schema(&conn)?;
        let collection = get_or_create_collection(&conn, name, options)?;
        if collection.metric != options.metric {
            return Err(RagError::index_msg(format!(
                "collection {} uses metric {}, configured {}",
                name, collection.metric, options.metric
            )));
        }

        tracing::debug!(
            "opened collection {} (metric {}, dimension {:?})",
            collection.name,
            collection.metric,
            collection.dimension
        );

        Ok(Self { conn, collection })
    }

    pub fn collection(&self) -> &CollectionInfo {
        &self.collection
    }

    /// Retrieves a stored record by id.
    pub fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT id, document, metadata, embedding
                FROM records
                WHERE collection = ?1 AND id = ?2
                "#,
                params![self.collection.name, id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| RagError::index("Failed to query record", e))?;

        row.map(|(id, document, metadata, blob)| {
            Ok(StoredRecord {
                record: VectorRecord {
                    id,
                    text: document,
                    metadata: decode_metadata(&metadata)?,
                },
                embedding: blob_to_embedding(&blob),
            })
        })
        .transpose()
    }

    /// Lists all record ids, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM records WHERE collection = ?1 ORDER BY id")
            .map_err(|e| RagError::index("Failed to list ids", e))?;

        let ids = stmt
            .query_map(params![self.collection.name], |row| row.get(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<String>>>())
            .map_err(|e| RagError::index("Failed to list ids", e))?;
        Ok(ids)
    }

    /// Closes the connection explicitly.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| RagError::index("Failed to close index", e))
    }

    fn check_dimension(&self, actual: usize) -> Result<()> {
        match self.collection.dimension {
            Some(expected) if expected != actual => {
                Err(RagError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

impl VectorIndex for SqliteIndex {
    fn upsert(&mut self, entries: &[IndexEntry<'_>], model_id: &str) -> Result<()> {
        let Some(first) = entries.first() else {
            return Ok(());
        };

        let dimension = first.embedding.len();
        if dimension == 0 {
            return Err(RagError::InvalidArgument(format!(
                "empty embedding for record {}",
                first.record.id
            )));
        }
        self.check_dimension(dimension)?;
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.embedding.len(),
            });
        }

        let updated_at = unix_now();
        let name = self.collection.name.clone();
        let tx = self
            .conn
            .transaction()
            .map_err(|e| RagError::index("Failed to begin upsert", e))?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO records (collection, id, document, metadata, embedding, updated_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ON CONFLICT(collection, id) DO UPDATE SET
                        document = excluded.document,
                        metadata = excluded.metadata,
                        embedding = excluded.embedding,
                        updated_at = excluded.updated_at
                    "#,
                )
                .map_err(|e| RagError::index("Failed to prepare upsert", e))?;

            for entry in entries {
                let metadata = serde_json::to_string(&entry.record.metadata)
                    .map_err(|e| RagError::index_msg(format!("Failed to encode metadata: {}", e)))?;
                stmt.execute(params![
                    name,
                    entry.record.id,
                    entry.record.text,
                    metadata,
                    embedding_to_blob(entry.embedding),
                    updated_at
                ])
                .map_err(|e| RagError::index(format!("Failed to upsert {}", entry.record.id), e))?;
            }
        }

        tx.execute(
            r#"
            UPDATE collections
            SET dimension = COALESCE(dimension, ?1), model_id = ?2
            WHERE name = ?3
            "#,
            params![dimension as i64, model_id, name],
        )
        .map_err(|e| RagError::index("Failed to record collection settings", e))?;

        tx.commit()
            .map_err(|e| RagError::index("Failed to commit upsert", e))?;
        self.collection.dimension = Some(dimension);
        self.collection.model_id = Some(model_id.to_string());
        Ok(())
    }

    fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<IndexHit>> {
        let Some(dimension) = self.collection.dimension else {
            return Ok(Vec::new());
        };
        if vector.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT id, document, metadata, embedding
                FROM records
                WHERE collection = ?1
                "#,
            )
            .map_err(|e| RagError::index("Failed to prepare query", e))?;

        let rows = stmt
            .query_map(params![self.collection.name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| RagError::index("Failed to scan records", e))?;

        let metric = self.collection.metric;
        let mut hits = Vec::with_capacity(rows.len());
        for (id, text, metadata, blob) in rows {
            let embedding = blob_to_embedding(&blob);
            if embedding.len() != dimension {
                return Err(RagError::index_msg(format!(
                    "record {} has {} dimensions, collection has {}",
                    id,
                    embedding.len(),
                    dimension
                )));
            }
            hits.push(IndexHit {
                distance: metric.distance(vector, &embedding),
                metadata: decode_metadata(&metadata)?,
                id,
                text,
            });
        }

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);

        Ok(hits)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE collection = ?1",
                params![self.collection.name],
                |row| row.get(0),
            )
            .map_err(|e| RagError::index("Failed to count records", e))?;
        Ok(count as usize)
    }

    fn metric(&self) -> DistanceMetric {
        self.collection.metric
    }

    fn dimension(&self) -> Option<usize> {
        self.collection.dimension
    }

    fn model_id(&self) -> Option<&str> {
        self.collection.model_id.as_deref()
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            metric TEXT NOT NULL,
            dimension INTEGER,
            model_id TEXT,
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            document TEXT NOT NULL,
            metadata TEXT NOT NULL,
            embedding BLOB NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        );
        "#,
    )
    .map_err(|e| RagError::index("Failed to initialize index schema", e))?;

    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION],
    )
    .map_err(|e| RagError::index("Failed to write schema version", e))?;

    Ok(())
}

fn get_or_create_collection(
    conn: &Connection,
    name: &str,
    options: &CollectionOptions,
) -> Result<CollectionInfo> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO collections (name, description, metric, dimension, model_id, created_at)
        VALUES (?1, ?2, ?3, NULL, NULL, ?4)
        "#,
        params![name, options.description, options.metric.as_str(), unix_now()],
    )
    .map_err(|e| RagError::index(format!("Failed to create collection {}", name), e))?;

    let (description, metric, dimension, model_id) = conn
        .query_row(
            "SELECT description, metric, dimension, model_id FROM collections WHERE name = ?1",
            params![name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .map_err(|e| RagError::index(format!("Failed to read collection {}", name), e))?;

    let metric = metric
        .parse::<DistanceMetric>()
        .map_err(|e| RagError::index_msg(e))?;

    Ok(CollectionInfo {
        name: name.to_string(),
        description,
        metric,
        dimension: dimension.map(|d| d as usize),
        model_id,
    })
}

fn decode_metadata(raw: &str) -> Result<BTreeMap<String, String>> {
    serde_json::from_str(raw)
        .map_err(|e| RagError::index_msg(format!("Corrupt metadata in index: {}", e)))
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Converts an embedding vector to a compact blob.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Converts a blob back to an embedding vector.
fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Computes cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    (dot_product / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, text: &str) -> VectorRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("row_index".to_string(), "0".to_string());
        VectorRecord {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        }
    }

    const MODEL: &str = "test-model";

    fn entry<'a>(record: &'a VectorRecord, embedding: &'a [f32]) -> IndexEntry<'a> {
        IndexEntry { record, embedding }
    }

    fn memory_index() -> SqliteIndex {
        SqliteIndex::open_in_memory(DEFAULT_COLLECTION, &CollectionOptions::default()).unwrap()
    }

    #[test]
    fn test_storage_create_and_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("index.sqlite");

        let mut index =
            SqliteIndex::open(&db_path, DEFAULT_COLLECTION, &CollectionOptions::default()).unwrap();
        assert!(db_path.exists());
        let rec = record("a", "alpha");
        index.upsert(&[entry(&rec, &[1.0, 0.0])], MODEL).unwrap();
        index.close().unwrap();

        let index =
            SqliteIndex::open(&db_path, DEFAULT_COLLECTION, &CollectionOptions::default()).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.dimension(), Some(2));
        assert_eq!(
            index.collection().description,
            DEFAULT_COLLECTION_DESCRIPTION
        );
    }

    #[test]
    fn test_upsert_overwrites_by_id() {
        let mut index = memory_index();
        let first = record("a", "first");
        let second = record("a", "second");
        index.upsert(&[entry(&first, &[1.0, 0.0])], MODEL).unwrap();
        index.upsert(&[entry(&second, &[0.0, 1.0])], MODEL).unwrap();

        assert_eq!(index.count().unwrap(), 1);
        let stored = index.get("a").unwrap().unwrap();
        assert_eq!(stored.record.text, "second");
        assert_eq!(stored.embedding, vec![0.0, 1.0]);
        assert_eq!(stored.record.metadata["row_index"], "0");
    }

    #[test]
    fn test_similarity_search_orders_by_distance() {
        let mut index = memory_index();
        let a = record("a", "a");
        let b = record("b", "b");
        let c = record("c", "c");
        index
            .upsert(
                &[
                    entry(&a, &[1.0, 0.0, 0.0]),
                    entry(&b, &[0.0, 1.0, 0.0]),
                    entry(&c, &[0.9, 0.1, 0.0]),
                ],
                MODEL,
            )
            .unwrap();

        let hits = index.query(&[1.0, 0.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "c");
        assert!(hits[0].distance.abs() < 1e-6);
        assert!(hits[0].distance <= hits[1].distance);

        let all = index.query(&[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].id, "b");
        assert!((all[2].distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut index = memory_index();
        let a = record("a", "a");
        index.upsert(&[entry(&a, &[1.0, 0.0])], MODEL).unwrap();

        let err = index.query(&[1.0, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));

        let b = record("b", "b");
        let err = index.upsert(&[entry(&b, &[1.0])], MODEL).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn test_query_empty_collection() {
        let index = memory_index();
        assert!(index.query(&[1.0, 2.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_metric_is_fixed_at_creation() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        SqliteIndex::open(&db_path, "rubric", &CollectionOptions::default()).unwrap();

        let l2 = CollectionOptions {
            metric: DistanceMetric::L2,
            ..Default::default()
        };
        let err = SqliteIndex::open(&db_path, "rubric", &l2).err().unwrap();
        assert!(matches!(err, RagError::IndexUnavailable { .. }));

        // Another collection in the same file may pick its own metric.
        let other = SqliteIndex::open(&db_path, "other", &l2).unwrap();
        assert_eq!(other.metric(), DistanceMetric::L2);
    }

    #[test]
    fn test_collections_are_isolated() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let mut one = SqliteIndex::open(&db_path, "one", &CollectionOptions::default()).unwrap();
        let two = SqliteIndex::open(&db_path, "two", &CollectionOptions::default()).unwrap();

        let a = record("a", "a");
        one.upsert(&[entry(&a, &[1.0])], MODEL).unwrap();
        assert_eq!(one.count().unwrap(), 1);
        assert_eq!(two.count().unwrap(), 0);
    }

    #[test]
    fn test_model_id_written_with_records() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("index.sqlite");
        let mut index =
            SqliteIndex::open(&db_path, DEFAULT_COLLECTION, &CollectionOptions::default()).unwrap();
        assert_eq!(index.model_id(), None);

        let a = record("a", "a");
        let b = record("b", "b");
        let err = index
            .upsert(&[entry(&a, &[1.0, 0.0]), entry(&b, &[1.0])], "hash-2")
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
        assert_eq!(index.count().unwrap(), 0);
        assert_eq!(index.model_id(), None);

        index.upsert(&[entry(&a, &[1.0, 0.0])], "hash-2").unwrap();
        drop(index);

        let index =
            SqliteIndex::open(&db_path, DEFAULT_COLLECTION, &CollectionOptions::default()).unwrap();
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.model_id(), Some("hash-2"));
        assert_eq!(index.dimension(), Some(2));
    }

    #[test]
    fn test_metric_distances() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let opposite = [-1.0, 0.0];
        assert!((DistanceMetric::Cosine.distance(&a, &b) - 1.0).abs() < 1e-6);
        assert!((DistanceMetric::Cosine.distance(&a, &opposite) - 2.0).abs() < 1e-6);
        assert!((DistanceMetric::L2.distance(&a, &b) - 2.0).abs() < 1e-6);
        assert!((DistanceMetric::Ip.distance(&a, &a)).abs() < 1e-6);
        assert_eq!("L2".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
        assert!("manhattan".parse::<DistanceMetric>().is_err());
    }
}
