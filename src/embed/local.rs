//! Deterministic local-space embedder
//!
//! Hashes each token into a fixed-dimension feature vector. Not a learned
//! model, but stable across runs and processes, which is what the `local`
//! space guarantees: identical text always maps to the identical vector.

use super::{normalize_vector, Embedder, EmbeddingSpace};
use crate::error::Result;
use async_trait::async_trait;

pub struct LocalEmbedder {
    dimension: usize,
}

impl LocalEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();

            let bucket = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                % self.dimension;
            // Second hash byte decides the sign so token collisions
            // partially cancel instead of always accumulating
            let sign = if bytes[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize_vector(&vector)
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn space(&self) -> EmbeddingSpace {
        EmbeddingSpace::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_output() {
        let embedder = LocalEmbedder::new(64);
        let a = embedder.embed(vec!["hello world".to_string()]).await.unwrap();
        let b = embedder.embed(vec!["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_dimension_respected() {
        let embedder = LocalEmbedder::new(32);
        let vectors = embedder.embed(vec!["some text".to_string()]).await.unwrap();
        assert_eq!(vectors[0].len(), 32);
    }

    #[tokio::test]
    async fn test_different_texts_differ() {
        let embedder = LocalEmbedder::new(64);
        let vectors = embedder
            .embed(vec![
                "rust systems programming".to_string(),
                "gardening for beginners".to_string(),
            ])
            .await
            .unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn test_output_is_normalized() {
        let embedder = LocalEmbedder::new(64);
        let vectors = embedder
            .embed(vec!["normalize this vector please".to_string()])
            .await
            .unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
