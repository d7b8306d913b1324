// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for rubric-rag
//!
//! Loads configuration from .rubric-rag.toml in current directory or
//! ~/.config/rubric-rag/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::embedding::{
    CollectionOptions, DistanceMetric, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIM,
};
use crate::rubric::{
    RecordBuilder, SourceLayout, DEFAULT_BOILERPLATE_MARKER, DEFAULT_HEADER_LABEL,
};
use crate::utils::DATA_DIR;

/// Config file name looked up in the current directory.
pub const CONFIG_FILE: &str = ".rubric-rag.toml";

/// Example questions walked through by the `demo` command.
pub const DEFAULT_DEMO_QUERIES: &[&str] = &[
    "What questions are about passions and goals?",
    "What are the grading criteria?",
    "What questions relate to career opportunities?",
    "What is the scoring scheme?",
    "What questions ask about values and role models?",
];

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// Local fastembed model
    #[default]
    Builtin,
    /// External command speaking JSON on stdin/stdout
    Command,
    /// Deterministic token-hash embeddings (offline, tests)
    Hash,
}

/// Rubric source configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path to the SQLite database holding the rubric tables
    pub path: Option<PathBuf>,
    pub line_items_table: Option<String>,
    pub grading_map_table: Option<String>,
    pub question_column: Option<String>,
    pub section_column: Option<String>,
    pub points_column: Option<String>,
    pub grade_column: Option<String>,
    pub from_column: Option<String>,
    pub to_column: Option<String>,
    /// Questions starting with this text are skipped
    pub boilerplate_marker: Option<String>,
    /// Grade label of the grading map header row
    pub header_label: Option<String>,
}

impl SourceConfig {
    /// Get source path (defaults to thrivemap_grading.db)
    pub fn path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from("thrivemap_grading.db"))
    }

    /// Table and column names, falling back to the rubric export defaults
    pub fn layout(&self) -> SourceLayout {
        let defaults = SourceLayout::default();
        let pick = |value: &Option<String>, default: String| value.clone().unwrap_or(default);
        SourceLayout {
            line_items_table: pick(&self.line_items_table, defaults.line_items_table),
            grading_map_table: pick(&self.grading_map_table, defaults.grading_map_table),
            question_column: pick(&self.question_column, defaults.question_column),
            section_column: pick(&self.section_column, defaults.section_column),
            points_column: pick(&self.points_column, defaults.points_column),
            grade_column: pick(&self.grade_column, defaults.grade_column),
            from_column: pick(&self.from_column, defaults.from_column),
            to_column: pick(&self.to_column, defaults.to_column),
        }
    }

    pub fn record_builder(&self) -> RecordBuilder {
        RecordBuilder::new(
            self.boilerplate_marker
                .as_deref()
                .unwrap_or(DEFAULT_BOILERPLATE_MARKER),
            self.header_label.as_deref().unwrap_or(DEFAULT_HEADER_LABEL),
        )
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Index database file (default: .rubric-rag/index.sqlite)
    pub path: Option<PathBuf>,
    /// Collection name (default: thrivemap_rubric)
    pub collection: Option<String>,
    /// Distance metric used when the collection is created
    pub metric: Option<DistanceMetric>,
    pub description: Option<String>,
}

impl IndexConfig {
    /// Get index path, relative to `root` unless configured absolute
    pub fn path(&self, root: &Path) -> PathBuf {
        match &self.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root.join(path),
            None => root.join(DATA_DIR).join("index.sqlite"),
        }
    }

    /// Get collection name (defaults to thrivemap_rubric)
    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(DEFAULT_COLLECTION)
    }

    /// Get distance metric (defaults to cosine)
    pub fn metric(&self) -> DistanceMetric {
        self.metric.unwrap_or_default()
    }

    pub fn collection_options(&self) -> CollectionOptions {
        let mut options = CollectionOptions {
            metric: self.metric(),
            ..Default::default()
        };
        if let Some(description) = &self.description {
            options.description = description.clone();
        }
        options
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, hash)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the command provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Texts per embedding call
    pub batch_size: Option<usize>,
    /// Vector size for the hash provider
    pub dimension: Option<usize>,
    /// Builtin provider: characters kept per text before inference
    pub max_chars: Option<usize>,
    /// Builtin provider: L2-normalize model output (default: true)
    pub normalize: Option<bool>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to "local-model-id")
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or("local-model-id")
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Texts per embedding call, when configured to a positive value
    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size.filter(|b| *b > 0)
    }

    /// Get builtin truncation length (defaults to 2000 characters)
    pub fn max_chars(&self) -> usize {
        self.max_chars.filter(|c| *c > 0).unwrap_or(2000)
    }

    /// Whether builtin output is normalized (defaults to true)
    pub fn normalize(&self) -> bool {
        self.normalize.unwrap_or(true)
    }

    /// Get hash provider dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_EMBEDDING_DIM)
    }
}

/// Query configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of results for `query` (default: 5)
    pub top_k: Option<usize>,
    /// Number of results per demo question (default: 3)
    pub demo_top_k: Option<usize>,
    /// Questions for the `demo` command
    pub demo_queries: Option<Vec<String>>,
}

impl QueryConfig {
    pub fn top_k(&self) -> usize {
        self.top_k.filter(|k| *k > 0).unwrap_or(5)
    }

    pub fn demo_top_k(&self) -> usize {
        self.demo_top_k.filter(|k| *k > 0).unwrap_or(3)
    }

    pub fn demo_queries(&self) -> Vec<String> {
        match &self.demo_queries {
            Some(queries) if !queries.is_empty() => queries.clone(),
            _ => DEFAULT_DEMO_QUERIES.iter().map(|q| q.to_string()).collect(),
        }
    }
}

/// Configuration loaded from .rubric-rag.toml or ~/.config/rubric-rag/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default output format (text or json)
    pub default_format: Option<String>,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub embeddings: EmbeddingConfig,

    #[serde(default)]
    pub query: QueryConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .rubric-rag.toml in current directory
    /// 2. ~/.config/rubric-rag/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(CONFIG_FILE)) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("rubric-rag").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Parses a config file; unreadable or invalid files yield `None`.
    pub fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Whether the configured default output format is JSON
    pub fn prefers_json(&self) -> bool {
        self.default_format
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_rubric_export() {
        let config = Config::default();
        assert_eq!(config.source.path(), PathBuf::from("thrivemap_grading.db"));
        assert_eq!(config.source.layout(), SourceLayout::default());
        assert_eq!(config.index.collection(), DEFAULT_COLLECTION);
        assert_eq!(config.index.metric(), DistanceMetric::Cosine);
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Builtin);
        assert_eq!(config.embeddings.dimension(), 384);
        assert_eq!(config.embeddings.batch_size(), None);
        assert_eq!(config.embeddings.max_chars(), 2000);
        assert!(config.embeddings.normalize());
        assert_eq!(config.query.top_k(), 5);
        assert_eq!(config.query.demo_top_k(), 3);
        assert_eq!(config.query.demo_queries().len(), 5);
        assert!(!config.prefers_json());
    }

    #[test]
    fn parses_all_sections() {
        let config: Config = toml::from_str(
            r#"
default_format = "json"

[source]
path = "rubric.db"
grading_map_table = "Grades"
header_label = "Grades"

[index]
path = "store/idx.sqlite"
collection = "rubric_v2"
metric = "l2"

[embeddings]
provider = "hash"
dimension = 64

[query]
top_k = 7
demo_queries = ["one"]
"#,
        )
        .unwrap();

        assert!(config.prefers_json());
        assert_eq!(config.source.layout().grading_map_table, "Grades");
        assert_eq!(config.source.layout().line_items_table, "Line_By_Line");
        assert_eq!(
            config.index.path(Path::new("/work")),
            PathBuf::from("/work/store/idx.sqlite")
        );
        assert_eq!(config.index.collection(), "rubric_v2");
        assert_eq!(config.index.collection_options().metric, DistanceMetric::L2);
        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Hash);
        assert_eq!(config.embeddings.dimension(), 64);
        assert_eq!(config.query.top_k(), 7);
        assert_eq!(config.query.demo_queries(), vec!["one".to_string()]);
    }

    #[test]
    fn builtin_settings_come_from_embeddings_section() {
        let config: Config = toml::from_str(
            r#"
[embeddings]
batch_size = 0
max_chars = 512
normalize = false
"#,
        )
        .unwrap();

        assert_eq!(config.embeddings.provider(), EmbeddingProviderType::Builtin);
        assert_eq!(config.embeddings.batch_size(), None);
        assert_eq!(config.embeddings.max_chars(), 512);
        assert!(!config.embeddings.normalize());
    }

    #[test]
    fn default_index_path_lives_in_data_dir() {
        let config = Config::default();
        assert_eq!(
            config.index.path(Path::new("/work")),
            PathBuf::from("/work").join(DATA_DIR).join("index.sqlite")
        );
    }

    #[test]
    fn invalid_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[index\nmetric = ").unwrap();
        assert!(Config::load_from_path(&path).is_none());
    }
}
