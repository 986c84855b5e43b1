//! CLI commands implementation

pub mod documents;
pub mod ingest;
pub mod init;
pub mod query;
pub mod status;

pub use documents::*;
pub use ingest::*;
pub use init::*;
pub use query::*;
pub use status::*;

use crate::admission::AdmissionController;
use crate::config::Config;
use crate::embed::cache::EmbeddingCache;
use crate::embed::create_embedders;
use crate::error::Result;
use crate::extract::PlainTextExtractor;
use crate::meta::MetaDb;
use crate::notify::LogNotifier;
use crate::pipeline::ProcessingPipeline;
use crate::rank::Ranker;
use crate::store::ChunkStore;
use std::sync::Arc;

/// Wire the embedding cache over the configured backends, with its
/// periodic cleanup task running for as long as the cache lives
pub(crate) fn build_cache(config: &Config) -> Result<Arc<EmbeddingCache>> {
    let embedders = create_embedders(&config.embedding)?;
    let cache = Arc::new(EmbeddingCache::new(embedders, &config.cache));
    // dropping the handle detaches the task; it winds down with the cache
    let _ = cache.spawn_cleanup(&config.cache);
    Ok(cache)
}

/// Wire a processing pipeline for one command invocation
pub(crate) fn build_pipeline(config: &Config, db: &MetaDb) -> Result<ProcessingPipeline> {
    Ok(ProcessingPipeline::new(
        db.clone(),
        build_cache(config)?,
        Arc::new(PlainTextExtractor),
        Arc::new(LogNotifier),
        AdmissionController::new(&config.admission),
        config.clone(),
    ))
}

/// Wire a chunk store with the configured blend weights
pub(crate) fn build_store(config: &Config, db: &MetaDb) -> ChunkStore {
    ChunkStore::new(
        db.clone(),
        Ranker::new(config.query.vector_weight, config.query.lexical_weight),
    )
}
