//! Retrieval orchestrator
//!
//! Validates a multi-document query, fans it out across the selected
//! documents' chunk stores, and returns provenance-tagged chunks grouped by
//! document. Cross-document re-ranking is deliberately absent: each group
//! is internally ranked, groups follow selector order.

use crate::admission::AdmissionController;
use crate::config::QueryConfig;
use crate::embed::cache::EmbeddingCache;
use crate::embed::EmbeddingSpace;
use crate::error::{Error, Result};
use crate::rank::SearchMode;
use crate::registry::{DocumentRegistry, RegistryEntry};
use crate::store::ChunkStore;
use futures::future::try_join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// A retrieved chunk tagged with its source document
#[derive(Debug, Clone, Serialize)]
pub struct SourcedChunk {
    pub document_id: String,
    pub document_title: String,
    pub page_number: u32,
    pub content: String,
    pub score: f32,
}

/// Result of a multi-document query
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub chunks: Vec<SourcedChunk>,
    pub embedding_space: EmbeddingSpace,
    pub registry_version: u64,
}

/// Fan-out retrieval across one-to-many documents
pub struct RetrievalOrchestrator {
    registry: Arc<DocumentRegistry>,
    store: ChunkStore,
    cache: Arc<EmbeddingCache>,
    admission: AdmissionController,
    config: QueryConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        registry: Arc<DocumentRegistry>,
        store: ChunkStore,
        cache: Arc<EmbeddingCache>,
        admission: AdmissionController,
        config: QueryConfig,
    ) -> Self {
        Self {
            registry,
            store,
            cache,
            admission,
            config,
        }
    }

    /// Validate the selectors against one registry snapshot and run the
    /// per-document searches.
    pub async fn query(&self, selectors: &[String], query_text: &str) -> Result<QueryResponse> {
        let _permit = self.admission.admit_query()?;

        let snapshot = self.registry.current().await;
        let entries = validate_selection(selectors, self.config.max_selectors, |s| {
            snapshot.resolve(s)
        })?;

        let space = entries[0].embedding_space;
        let query_vector = self.cache.get_or_compute(query_text, space).await?;

        // fan out per document; result groups keep selector order
        let query_vector = &query_vector;
        let searches = entries.iter().map(|entry| async move {
            let scored = self
                .store
                .search(
                    &entry.document_id,
                    query_text,
                    &query_vector,
                    self.config.k,
                    SearchMode::Hybrid,
                )
                .await?;
            debug!(
                document = %entry.slug,
                results = scored.len(),
                "Per-document search complete"
            );
            Ok::<_, Error>(scored)
        });

        let mut chunks = Vec::new();
        for (entry, scored) in entries.iter().zip(try_join_all(searches).await?) {
            chunks.extend(scored.into_iter().map(|c| SourcedChunk {
                document_id: entry.document_id.clone(),
                document_title: entry.title.clone(),
                page_number: c.page_number,
                content: c.content,
                score: c.score,
            }));
        }

        Ok(QueryResponse {
            chunks,
            embedding_space: space,
            registry_version: snapshot.version(),
        })
    }
}

/// Resolve and cross-check the selected documents.
///
/// Every failure mode is a distinct, user-facing validation error naming
/// the offenders, so the caller can correct the request.
pub fn validate_selection(
    selectors: &[String],
    max_selectors: usize,
    resolve: impl Fn(&str) -> Option<Arc<RegistryEntry>>,
) -> Result<Vec<Arc<RegistryEntry>>> {
    if selectors.is_empty() {
        return Err(Error::Validation("No documents selected".to_string()));
    }

    if selectors.len() > max_selectors {
        return Err(Error::Validation(format!(
            "{} documents selected, at most {} are allowed per query",
            selectors.len(),
            max_selectors
        )));
    }

    let mut entries = Vec::with_capacity(selectors.len());
    let mut unknown = Vec::new();
    for selector in selectors {
        match resolve(selector) {
            Some(entry) if entry.active => entries.push(entry),
            // Inactive documents are hidden, not distinguishable from
            // unknown ones
            _ => unknown.push(selector.clone()),
        }
    }
    if !unknown.is_empty() {
        return Err(Error::Validation(format!(
            "Documents not available: {}",
            unknown.join(", ")
        )));
    }

    let owners: BTreeSet<&str> = entries.iter().map(|e| e.owner_id.as_str()).collect();
    if owners.len() > 1 {
        let names: BTreeSet<&str> = entries.iter().map(|e| e.owner_name.as_str()).collect();
        return Err(Error::Validation(format!(
            "Documents belong to different owners: {}",
            names.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    let spaces: BTreeSet<String> = entries
        .iter()
        .map(|e| e.embedding_space.to_string())
        .collect();
    if spaces.len() > 1 {
        return Err(Error::Validation(format!(
            "Documents use incompatible embedding spaces: {}",
            spaces.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn entry(
        id: &str,
        slug: &str,
        owner_id: &str,
        owner_name: &str,
        space: EmbeddingSpace,
        active: bool,
    ) -> Arc<RegistryEntry> {
        Arc::new(RegistryEntry {
            document_id: id.to_string(),
            slug: slug.to_string(),
            title: format!("Title {}", slug),
            owner_id: owner_id.to_string(),
            owner_name: owner_name.to_string(),
            embedding_space: space,
            public: true,
            active,
        })
    }

    fn directory() -> HashMap<String, Arc<RegistryEntry>> {
        let mut map = HashMap::new();
        for e in [
            entry("d1", "acme-guide", "o1", "Acme", EmbeddingSpace::Local, true),
            entry("d2", "acme-manual", "o1", "Acme", EmbeddingSpace::Local, true),
            entry("d3", "globex-faq", "o2", "Globex", EmbeddingSpace::Local, true),
            entry("d4", "acme-cloud", "o1", "Acme", EmbeddingSpace::Provider, true),
            entry("d5", "acme-retired", "o1", "Acme", EmbeddingSpace::Local, false),
        ] {
            map.insert(e.slug.clone(), Arc::clone(&e));
            map.insert(e.document_id.clone(), e);
        }
        map
    }

    fn validate(selectors: &[&str], max: usize) -> Result<Vec<Arc<RegistryEntry>>> {
        let dir = directory();
        let selectors: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
        validate_selection(&selectors, max, |s| dir.get(s).cloned())
    }

    #[test]
    fn test_valid_selection_resolves() {
        let entries = validate(&["acme-guide", "d2"], 5).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].document_id, "d1");
        assert_eq!(entries[1].document_id, "d2");
    }

    #[test]
    fn test_unknown_selectors_named() {
        let err = validate(&["acme-guide", "ghost", "phantom"], 5).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("not available"));
        assert!(message.contains("ghost"));
        assert!(message.contains("phantom"));
    }

    #[test]
    fn test_inactive_document_is_unavailable() {
        let err = validate(&["acme-retired"], 5).unwrap_err();
        assert!(err.to_string().contains("acme-retired"));
    }

    #[test]
    fn test_mixed_owners_named() {
        let err = validate(&["acme-guide", "globex-faq"], 5).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("different owners"));
        assert!(message.contains("Acme"));
        assert!(message.contains("Globex"));
    }

    #[test]
    fn test_mixed_spaces_named() {
        let err = validate(&["acme-guide", "acme-cloud"], 5).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("incompatible embedding spaces"));
        assert!(message.contains("local"));
        assert!(message.contains("provider"));
    }

    #[test]
    fn test_selector_ceiling_states_count() {
        let selectors = ["a", "b", "c", "d", "e", "f"];
        let err = validate(&selectors, 5).unwrap_err();
        let message = err.to_string();
        assert!(message.contains('6'));
        assert!(message.contains('5'));
    }

    #[test]
    fn test_empty_selection_rejected() {
        let err = validate(&[], 5).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
