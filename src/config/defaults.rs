//! Default values for configuration

use std::path::PathBuf;

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("folio")
}

pub fn default_db_file() -> PathBuf {
    default_data_dir().join("folio.db")
}

pub fn default_spool_dir() -> PathBuf {
    default_data_dir().join("spool")
}

pub fn default_max_upload_bytes() -> u64 {
    25 * 1024 * 1024
}

pub fn default_allowed_content_types() -> Vec<String> {
    vec![
        "application/pdf".to_string(),
        "text/plain".to_string(),
        "text/markdown".to_string(),
    ]
}

pub fn default_chunk_max_chars() -> usize {
    1200
}

pub fn default_chunk_overlap_chars() -> usize {
    150
}

pub fn default_chunk_min_chars() -> usize {
    50
}

pub fn default_embedding_space() -> String {
    "local".to_string()
}

pub fn default_provider_url() -> String {
    "http://localhost:8080/embed".to_string()
}

pub fn default_embedding_model() -> String {
    "folio-minilm".to_string()
}

pub fn default_embedding_dimension() -> usize {
    384
}

pub fn default_embedding_batch_size() -> usize {
    32
}

pub fn default_cache_max_entries() -> usize {
    10_000
}

pub fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

pub fn default_cache_cleanup_interval_secs() -> u64 {
    10 * 60
}

pub fn default_query_k() -> usize {
    5
}

pub fn default_max_selectors() -> usize {
    5
}

pub fn default_vector_weight() -> f32 {
    0.75
}

pub fn default_lexical_weight() -> f32 {
    0.25
}

pub fn default_stale_after_secs() -> i64 {
    300
}

pub fn default_persist_batch_size() -> usize {
    64
}

pub fn default_registry_refresh_secs() -> u64 {
    120
}

pub fn default_max_concurrent_jobs() -> usize {
    4
}

pub fn default_max_concurrent_queries() -> usize {
    32
}
