//! Chunk store: persistence format and hybrid retrieval for one document
//!
//! Embedding vectors are stored as little-endian f32 blobs next to the
//! chunk text. Search loads a document's chunks, scores each candidate with
//! the composite ranker, and sorts strictly by that score. Narrowing may
//! happen anywhere upstream; ordering is decided only here.

mod payload;

pub use payload::*;

use crate::error::{Error, Result};
use crate::meta::MetaDb;
use crate::rank::{self, Ranker, SearchMode};
use serde::Serialize;
use tracing::debug;

/// Encode an embedding as a little-endian f32 blob
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a little-endian f32 blob back into an embedding
pub fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::Integrity(format!(
            "Embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// A ranked chunk returned from a single-document search
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub page_number: u32,
    pub score: f32,
}

/// Per-document chunk retrieval
#[derive(Clone)]
pub struct ChunkStore {
    db: MetaDb,
    ranker: Ranker,
}

impl ChunkStore {
    pub fn new(db: MetaDb, ranker: Ranker) -> Self {
        Self { db, ranker }
    }

    /// Search one document's chunks.
    ///
    /// Returns at most `k` chunks ordered strictly by composite score
    /// descending, ties broken by chunk insertion order. The page number is
    /// read out of each chunk's payload bag.
    pub async fn search(
        &self,
        document_id: &str,
        query_text: &str,
        query_vector: &[f32],
        k: usize,
        mode: SearchMode,
    ) -> Result<Vec<ScoredChunk>> {
        let rows = self.db.chunks_for_document(document_id).await?;
        debug!(
            "Scoring {} chunks for document {} ({:?})",
            rows.len(),
            document_id,
            mode
        );

        let query_terms = rank::tokenize(query_text);
        let mut scored = Vec::with_capacity(rows.len());

        for row in rows {
            let embedding = decode_embedding(&row.embedding)?;
            let vector_similarity = rank::cosine_similarity(query_vector, &embedding);
            let lexical = match mode {
                SearchMode::Vector => 0.0,
                SearchMode::Hybrid => rank::lexical_overlap(&query_terms, &row.content),
            };
            let score = self.ranker.score(vector_similarity, lexical, mode);

            scored.push(ScoredChunk {
                chunk_id: row.id,
                chunk_index: row.chunk_index,
                content: row.content,
                page_number: page_number_from_payload(&row.payload_json),
                score,
            });
        }

        rank::sort_by_relevance(&mut scored, |c| (c.score, c.chunk_index));
        scored.truncate(k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EmbeddingSpace;
    use crate::meta::{DocumentSpec, NewChunk, Owner};

    fn blob_error_is_integrity() -> bool {
        matches!(decode_embedding(&[1, 2, 3]), Err(Error::Integrity(_)))
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let vector = vec![0.25f32, -1.5, 3.75, 0.0];
        let decoded = decode_embedding(&encode_embedding(&vector)).unwrap();
        assert_eq!(decoded, vector);
        assert!(blob_error_is_integrity());
    }

    async fn seeded_store() -> (ChunkStore, String) {
        let db = MetaDb::connect_memory().await.unwrap();
        db.init_schema().await.unwrap();

        let owner = Owner::new("acme".to_string(), "Acme".to_string());
        db.upsert_owner(&owner).await.unwrap();
        let doc = db
            .create_document(&DocumentSpec {
                slug: "doc".to_string(),
                title: "Doc".to_string(),
                owner_id: owner.id,
                embedding_space: EmbeddingSpace::Local,
                public: false,
            })
            .await
            .unwrap();

        let store = ChunkStore::new(db.clone(), Ranker::new(0.75, 0.25));
        (store, doc.id)
    }

    fn chunk(index: i64, content: &str, page: u32, embedding: &[f32]) -> NewChunk {
        NewChunk {
            chunk_index: index,
            content: content.to_string(),
            payload_json: format!(
                r#"{{"page_number":{},"char_start":0,"char_end":10,"content_hash":"h"}}"#,
                page
            ),
            embedding: encode_embedding(embedding),
        }
    }

    #[tokio::test]
    async fn test_search_orders_by_score_not_insertion() {
        let (store, doc_id) = seeded_store().await;

        // Inserted so the best match lands last physically
        store
            .db
            .insert_chunks(
                &doc_id,
                &[
                    chunk(0, "unrelated filler text", 1, &[0.0, 1.0, 0.0]),
                    chunk(1, "slightly related words", 2, &[0.5, 0.5, 0.0]),
                    chunk(2, "the exact answer lives here", 3, &[1.0, 0.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search(&doc_id, "exact answer", &[1.0, 0.0, 0.0], 5, SearchMode::Hybrid)
            .await
            .unwrap();

        assert_eq!(results[0].chunk_index, 2);
        assert_eq!(results[0].page_number, 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_k_bounds_results() {
        let (store, doc_id) = seeded_store().await;
        let chunks: Vec<NewChunk> = (0..10)
            .map(|i| chunk(i, &format!("chunk number {}", i), 1, &[i as f32, 1.0]))
            .collect();
        store.db.insert_chunks(&doc_id, &chunks).await.unwrap();

        let results = store
            .search(&doc_id, "chunk", &[1.0, 0.0], 3, SearchMode::Hybrid)
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_lexical_boost_lifts_term_matches() {
        let (store, doc_id) = seeded_store().await;

        // Identical vectors: only the lexical boost can separate them
        store
            .db
            .insert_chunks(
                &doc_id,
                &[
                    chunk(0, "nothing in common here", 1, &[1.0, 0.0]),
                    chunk(1, "folio retrieval engine internals", 1, &[1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hybrid = store
            .search(&doc_id, "retrieval engine", &[1.0, 0.0], 5, SearchMode::Hybrid)
            .await
            .unwrap();
        assert_eq!(hybrid[0].chunk_index, 1);

        // Vector mode falls back to the stable tiebreak
        let vector = store
            .search(&doc_id, "retrieval engine", &[1.0, 0.0], 5, SearchMode::Vector)
            .await
            .unwrap();
        assert_eq!(vector[0].chunk_index, 0);
    }

    #[tokio::test]
    async fn test_tie_broken_by_insertion_order() {
        let (store, doc_id) = seeded_store().await;
        store
            .db
            .insert_chunks(
                &doc_id,
                &[
                    chunk(5, "same text", 1, &[1.0, 0.0]),
                    chunk(1, "same text", 1, &[1.0, 0.0]),
                    chunk(3, "same text", 1, &[1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store
            .search(&doc_id, "same text", &[1.0, 0.0], 5, SearchMode::Hybrid)
            .await
            .unwrap();
        let indexes: Vec<i64> = results.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indexes, vec![1, 3, 5]);
    }
}
