//! Configuration management for folio
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Upload acceptance and spooling
    #[serde(default)]
    pub upload: UploadConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunk: ChunkConfig,

    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Embedding cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Query / retrieval configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Processing pipeline configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Document registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Admission control configuration
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Upload validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_bytes: u64,

    /// Accepted MIME types
    #[serde(default = "default_allowed_content_types")]
    pub allowed_content_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_upload_bytes(),
            allowed_content_types: default_allowed_content_types(),
        }
    }
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum chunk size in characters
    #[serde(default = "default_chunk_max_chars")]
    pub max_chars: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap_chars")]
    pub overlap_chars: usize,

    /// Minimum chunk size in characters (smaller fragments are merged)
    #[serde(default = "default_chunk_min_chars")]
    pub min_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: default_chunk_max_chars(),
            overlap_chars: default_chunk_overlap_chars(),
            min_chars: default_chunk_min_chars(),
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider backend URL (used for the `provider` embedding space)
    #[serde(default = "default_provider_url")]
    pub provider_url: String,

    /// Model identifier sent to the provider backend
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match the model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding calls
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider_url: default_provider_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
        }
    }
}

/// Embedding cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached vectors
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval between periodic cleanup passes in seconds
    #[serde(default = "default_cache_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
            ttl_secs: default_cache_ttl_secs(),
            cleanup_interval_secs: default_cache_cleanup_interval_secs(),
        }
    }
}

/// Query configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Results per document
    #[serde(default = "default_query_k")]
    pub k: usize,

    /// Maximum number of document selectors per query
    #[serde(default = "default_max_selectors")]
    pub max_selectors: usize,

    /// Weight of the normalized vector-similarity score
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Weight of the lexical term-overlap boost
    #[serde(default = "default_lexical_weight")]
    pub lexical_weight: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            k: default_query_k(),
            max_selectors: default_max_selectors(),
            vector_weight: default_vector_weight(),
            lexical_weight: default_lexical_weight(),
        }
    }
}

/// Processing pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// A `processing` job untouched for longer than this is treated as
    /// abandoned and eligible for reset
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: i64,

    /// Number of chunks persisted per batch
    #[serde(default = "default_persist_batch_size")]
    pub persist_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            persist_batch_size: default_persist_batch_size(),
        }
    }
}

/// Document registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Interval between automatic registry refreshes in seconds
    #[serde(default = "default_registry_refresh_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_registry_refresh_secs(),
        }
    }
}

/// Admission control configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum concurrently running ingestion jobs
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Maximum concurrently running retrieval queries
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_concurrent_queries: default_max_concurrent_queries(),
        }
    }
}

/// Filesystem paths used by folio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Data directory
    pub data_dir: PathBuf,

    /// SQLite database file
    pub db_file: PathBuf,

    /// Spool directory for uploaded files awaiting processing
    pub spool_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file: default_db_file(),
            spool_dir: default_spool_dir(),
        }
    }
}

impl Config {
    /// Default base directory for data, spool and config
    pub fn default_base_dir() -> PathBuf {
        default_data_dir()
    }

    /// Default config file location
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Default configuration with every path rooted under `base_dir`
    pub fn with_base_dir(base_dir: &Path) -> Self {
        let mut config = Config::default();
        config.paths.data_dir = base_dir.to_path_buf();
        config.paths.db_file = base_dir.join("folio.db");
        config.paths.spool_dir = base_dir.join("spool");
        config
    }

    /// Load configuration from a TOML file, or defaults if the file is absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => {
                debug!("Loading config from {:?}", p);
                let content = std::fs::read_to_string(p)?;
                let mut config: Config = toml::from_str(&content)?;
                // paths are derived from the config file's location, not
                // stored in the file itself
                if let Some(base_dir) = p.parent() {
                    config.paths = Config::with_base_dir(base_dir).paths;
                }
                config.validate()?;
                Ok(config)
            }
            Some(p) => Err(Error::Config(format!("Config file not found: {:?}", p))),
            None => Ok(Config::default()),
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create the data and spool directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.data_dir)?;
        std::fs::create_dir_all(&self.paths.spool_dir)?;
        Ok(())
    }

    /// Validate tunables that interact with each other
    pub fn validate(&self) -> Result<()> {
        if self.chunk.overlap_chars >= self.chunk.max_chars {
            return Err(Error::Config(format!(
                "chunk.overlap_chars ({}) must be smaller than chunk.max_chars ({})",
                self.chunk.overlap_chars, self.chunk.max_chars
            )));
        }
        if self.query.vector_weight < 0.0 || self.query.lexical_weight < 0.0 {
            return Err(Error::Config(
                "query weights must be non-negative".to_string(),
            ));
        }
        if self.query.vector_weight + self.query.lexical_weight == 0.0 {
            return Err(Error::Config(
                "at least one query weight must be positive".to_string(),
            ));
        }
        if self.query.max_selectors == 0 {
            return Err(Error::Config(
                "query.max_selectors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
