//! Document listing and registry refresh commands

use crate::embed::EmbeddingSpace;
use crate::error::Result;
use crate::meta::MetaDb;
use crate::registry::DocumentRegistry;
use serde::Serialize;
use tracing::info;

/// Filters for document listing
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    /// Only documents belonging to this owner name
    pub owner: Option<String>,
    /// Only documents in this embedding space
    pub space: Option<EmbeddingSpace>,
    /// Include soft-disabled documents
    pub include_inactive: bool,
}

/// One document for display
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub owner: String,
    pub embedding_space: EmbeddingSpace,
    pub public: bool,
    pub active: bool,
    pub chunks: i64,
}

/// Document listing plus the registry generation it was read from
#[derive(Debug, Clone, Serialize)]
pub struct DocumentList {
    pub registry_version: u64,
    pub documents: Vec<DocumentInfo>,
}

/// List documents through a registry snapshot
pub async fn cmd_documents(db: &MetaDb, filter: DocumentFilter) -> Result<DocumentList> {
    info!("Listing documents");

    let registry = DocumentRegistry::new(db.clone());
    let version = registry.load().await?;
    let snapshot = registry.current().await;

    let mut documents = Vec::new();
    for entry in snapshot.entries() {
        if !entry.active && !filter.include_inactive {
            continue;
        }
        if let Some(owner) = &filter.owner {
            if &entry.owner_name != owner {
                continue;
            }
        }
        if let Some(space) = filter.space {
            if entry.embedding_space != space {
                continue;
            }
        }

        documents.push(DocumentInfo {
            id: entry.document_id.clone(),
            slug: entry.slug.clone(),
            title: entry.title.clone(),
            owner: entry.owner_name.clone(),
            embedding_space: entry.embedding_space,
            public: entry.public,
            active: entry.active,
            chunks: db.count_chunks(&entry.document_id).await?,
        });
    }

    Ok(DocumentList {
        registry_version: version,
        documents,
    })
}

/// Rebuild the registry snapshot and report the new generation
pub async fn cmd_refresh(db: &MetaDb) -> Result<u64> {
    let registry = DocumentRegistry::new(db.clone());
    registry.load().await
}

/// Print the document list to console
pub fn print_documents(list: &DocumentList) {
    println!("\nDocuments (registry v{})\n", list.registry_version);

    if list.documents.is_empty() {
        println!("No documents. Use 'folio ingest' to add one.");
        return;
    }

    for doc in &list.documents {
        let marker = if doc.active { "" } else { " [inactive]" };
        println!("• {} ({}){}", doc.slug, doc.title, marker);
        println!("  ID: {}", doc.id);
        println!(
            "  Owner: {}, Space: {}, Chunks: {}",
            doc.owner, doc.embedding_space, doc.chunks
        );
        println!();
    }
}
