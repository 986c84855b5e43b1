//! Composite relevance scoring
//!
//! Combines normalized vector similarity with a lexical term-overlap boost.
//! The final ordering contract lives here: strictly non-increasing composite
//! score, ties broken by chunk insertion order, never by storage identifier.

use serde::{Deserialize, Serialize};

/// Retrieval mode for a chunk store search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Rank purely by vector similarity
    Vector,
    /// Blend vector similarity with the lexical boost
    Hybrid,
}

/// Cosine similarity between two vectors; 0.0 when shapes mismatch or
/// either norm is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Tokenize query text into lexical terms; terms under 2 chars are noise
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| t.len() >= 2)
        .collect()
}

/// Lexical overlap score in [0, 1]: fraction of query terms present in the
/// content, with partial credit for prefix matches
pub fn lexical_overlap(query_terms: &[String], content: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }

    let content_lower = content.to_lowercase();
    let content_terms: Vec<&str> = content_lower.split_whitespace().collect();

    let mut matched = 0.0f32;
    for term in query_terms {
        if content_lower.contains(term.as_str()) {
            matched += 1.0;
            continue;
        }
        // Partial credit for a shared 4-char prefix; the cut must land on a
        // char boundary, terms under 4 chars get none
        let prefix = match term.char_indices().nth(3) {
            Some((i, c)) => &term[..i + c.len_utf8()],
            None => continue,
        };
        if content_terms.iter().any(|c| c.starts_with(prefix)) {
            matched += 0.5;
        }
    }

    matched / query_terms.len() as f32
}

/// Weighted composite scorer.
///
/// The lexical/vector blend is a tunable, not a constant: callers pass the
/// configured weights and the ordering contract holds for any choice.
#[derive(Debug, Clone, Copy)]
pub struct Ranker {
    vector_weight: f32,
    lexical_weight: f32,
}

impl Ranker {
    pub fn new(vector_weight: f32, lexical_weight: f32) -> Self {
        Self {
            vector_weight,
            lexical_weight,
        }
    }

    /// Composite score for one candidate. Cosine output is shifted from
    /// [-1, 1] into [0, 1] before weighting so the lexical boost cannot be
    /// drowned by negative similarities.
    pub fn score(&self, vector_similarity: f32, lexical: f32, mode: SearchMode) -> f32 {
        let vector_norm = (vector_similarity + 1.0) / 2.0;
        match mode {
            SearchMode::Vector => vector_norm,
            SearchMode::Hybrid => {
                let total = self.vector_weight + self.lexical_weight;
                (self.vector_weight * vector_norm + self.lexical_weight * lexical) / total
            }
        }
    }
}

/// Sort scored items strictly by composite score descending, tie-broken by
/// insertion order ascending.
///
/// `key` extracts `(score, chunk_index)` from each item. Sorting by any
/// storage identifier instead of the score silently returns low-relevance
/// results, so every search path funnels through this function.
pub fn sort_by_relevance<T>(items: &mut [T], key: impl Fn(&T) -> (f32, i64)) {
    items.sort_by(|a, b| {
        let (score_a, index_a) = key(a);
        let (score_b, index_b) = key(b);
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(index_a.cmp(&index_b))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Shape mismatch and zero vectors degrade to 0
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_tokenize_drops_noise() {
        let terms = tokenize("How to configure X?");
        assert!(terms.contains(&"how".to_string()));
        assert!(terms.contains(&"configure".to_string()));
        assert!(!terms.contains(&"x".to_string()));
    }

    #[test]
    fn test_lexical_overlap_orders_sensibly() {
        let terms = tokenize("rust borrow checker");
        let on_topic = lexical_overlap(&terms, "The Rust borrow checker enforces aliasing rules");
        let off_topic = lexical_overlap(&terms, "Gardening tips for spring");
        assert!(on_topic > off_topic);
        assert!(on_topic <= 1.0);
    }

    #[test]
    fn test_lexical_overlap_handles_multibyte_terms() {
        // A term whose 4th byte is inside a multibyte char must not panic
        let terms = tokenize("café menu");
        assert_eq!(lexical_overlap(&terms, "lunch offerings today"), 0.0);

        // Prefix credit still applies across multibyte boundaries
        let terms = tokenize("naïveté check");
        let score = lexical_overlap(&terms, "a naïvely simple check");
        assert!((score - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_hybrid_score_blends_weights() {
        let ranker = Ranker::new(0.75, 0.25);
        let vector_only = ranker.score(0.8, 0.0, SearchMode::Hybrid);
        let with_lexical = ranker.score(0.8, 1.0, SearchMode::Hybrid);
        assert!(with_lexical > vector_only);

        // Vector mode ignores the lexical component entirely
        assert_eq!(
            ranker.score(0.8, 0.0, SearchMode::Vector),
            ranker.score(0.8, 1.0, SearchMode::Vector)
        );
    }

    #[test]
    fn test_sort_is_score_desc_with_stable_tiebreak() {
        let mut items = vec![
            ("low", 0.2f32, 0i64),
            ("tie-late", 0.5, 7),
            ("high", 0.9, 3),
            ("tie-early", 0.5, 2),
        ];
        sort_by_relevance(&mut items, |(_, score, index)| (*score, *index));

        let names: Vec<&str> = items.iter().map(|(n, _, _)| *n).collect();
        assert_eq!(names, vec!["high", "tie-early", "tie-late", "low"]);
    }

    #[test]
    fn test_sort_ignores_identifier_order() {
        // Items arranged so any identifier-ordered sort would differ
        let mut items = vec![(100i64, 0.1f32), (1, 0.9), (50, 0.5)];
        sort_by_relevance(&mut items, |(id, score)| (*score, *id));
        let scores: Vec<f32> = items.iter().map(|(_, s)| *s).collect();
        assert_eq!(scores, vec![0.9, 0.5, 0.1]);
    }
}
