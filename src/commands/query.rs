//! Query command implementation

use super::{build_cache, build_store};
use crate::admission::AdmissionController;
use crate::config::Config;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::query::{QueryResponse, RetrievalOrchestrator};
use crate::registry::DocumentRegistry;
use std::sync::Arc;
use tracing::info;

/// Query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Document selectors (ids or slugs) to search
    pub documents: Vec<String>,
    /// Results per document (defaults to the configured k)
    pub k: Option<usize>,
}

/// Execute a multi-document query
pub async fn cmd_query(
    config: &Config,
    db: &MetaDb,
    query_text: &str,
    options: QueryOptions,
) -> Result<QueryResponse> {
    info!("Querying {} document(s)", options.documents.len());

    let registry = Arc::new(DocumentRegistry::new(db.clone()));
    registry.load().await?;
    let _ = registry.spawn_auto_refresh(config.registry.refresh_interval_secs);

    let mut query_config = config.query.clone();
    if let Some(k) = options.k {
        query_config.k = k;
    }

    let orchestrator = RetrievalOrchestrator::new(
        registry,
        build_store(config, db),
        build_cache(config)?,
        AdmissionController::new(&config.admission),
        query_config,
    );

    orchestrator.query(&options.documents, query_text).await
}

/// Print query results to console
pub fn print_query_results(response: &QueryResponse) {
    println!(
        "\nFound {} chunks (space: {}, registry v{})\n",
        response.chunks.len(),
        response.embedding_space,
        response.registry_version
    );

    let mut current_doc: Option<&str> = None;
    for chunk in &response.chunks {
        if current_doc != Some(chunk.document_id.as_str()) {
            current_doc = Some(chunk.document_id.as_str());
            println!("{}", chunk.document_title);
        }

        let preview: String = if chunk.content.chars().count() > 200 {
            let cut: String = chunk.content.chars().take(200).collect();
            format!("{}...", cut.trim())
        } else {
            chunk.content.trim().to_string()
        };
        println!(
            "  [score: {:.3}, page {}] {}",
            chunk.score,
            chunk.page_number,
            preview.replace('\n', " ")
        );
    }
}
