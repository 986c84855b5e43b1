//! Embedding generation
//!
//! This module provides an abstraction over embedding backends:
//! - The `local` space uses a deterministic in-process embedder
//! - The `provider` space calls an external HTTP backend
//! - Vectors from different spaces are never comparable
//!
//! The content-addressed cache in [`cache`] sits in front of both.

pub mod cache;
mod http_backend;
mod local;

pub use http_backend::HttpEmbedder;
pub use local::LocalEmbedder;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// The family of vectors a document's chunks live in.
///
/// Documents tagged with different spaces cannot be queried together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingSpace {
    Local,
    Provider,
}

impl std::fmt::Display for EmbeddingSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbeddingSpace::Local => write!(f, "local"),
            EmbeddingSpace::Provider => write!(f, "provider"),
        }
    }
}

impl FromStr for EmbeddingSpace {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(EmbeddingSpace::Local),
            "provider" => Ok(EmbeddingSpace::Provider),
            _ => Err(Error::Config(format!("Unknown embedding space: {}", s))),
        }
    }
}

/// Trait for embedding backends
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// The space this backend's vectors belong to
    fn space(&self) -> EmbeddingSpace;
}

/// L2-normalize a vector in place semantics (returns a new vector)
pub fn normalize_vector(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Build the embedder for each supported space from configuration
pub fn create_embedders(
    config: &EmbeddingConfig,
) -> Result<HashMap<EmbeddingSpace, Arc<dyn Embedder>>> {
    let mut embedders: HashMap<EmbeddingSpace, Arc<dyn Embedder>> = HashMap::new();
    embedders.insert(
        EmbeddingSpace::Local,
        Arc::new(LocalEmbedder::new(config.dimension)),
    );
    embedders.insert(EmbeddingSpace::Provider, Arc::new(HttpEmbedder::new(config)?));
    Ok(embedders)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_roundtrip() {
        assert_eq!(
            "local".parse::<EmbeddingSpace>().unwrap(),
            EmbeddingSpace::Local
        );
        assert_eq!(
            "Provider".parse::<EmbeddingSpace>().unwrap(),
            EmbeddingSpace::Provider
        );
        assert!("openai".parse::<EmbeddingSpace>().is_err());
        assert_eq!(EmbeddingSpace::Local.to_string(), "local");
    }

    #[test]
    fn test_normalize_vector() {
        let normalized = normalize_vector(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);

        // Zero vector stays untouched
        assert_eq!(normalize_vector(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
