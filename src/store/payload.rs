//! Chunk payload attribute bag
//!
//! Position metadata travels as a JSON bag on each chunk row rather than as
//! dedicated columns. Readers pull the page number out of the bag at query
//! time; unknown attributes pass through untouched.

use crate::chunk::ChunkDraft;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured attributes stored with each chunk
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkPayload {
    /// 1-based page the chunk starts on
    pub page_number: u32,

    /// Character range within the page
    pub char_start: usize,
    pub char_end: usize,

    /// Hash of the chunk text
    pub content_hash: String,
}

impl ChunkPayload {
    pub fn from_draft(draft: &ChunkDraft) -> Self {
        Self {
            page_number: draft.page_number,
            char_start: draft.char_start,
            char_end: draft.char_end,
            content_hash: draft.hash.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Extract the page number from a raw payload bag.
///
/// Tolerates bags written by other producers: any JSON object with a
/// numeric `page_number` field qualifies; anything else reads as page 0.
pub fn page_number_from_payload(payload_json: &str) -> u32 {
    serde_json::from_str::<Value>(payload_json)
        .ok()
        .and_then(|v| v.get("page_number").cloned())
        .and_then(|n| n.as_u64())
        .map(|n| n as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip() {
        let payload = ChunkPayload {
            page_number: 3,
            char_start: 10,
            char_end: 250,
            content_hash: "abc".to_string(),
        };
        let json = payload.to_json().unwrap();
        assert_eq!(page_number_from_payload(&json), 3);
    }

    #[test]
    fn test_foreign_bag_with_extra_fields() {
        let json = r#"{"page_number": 7, "section": "intro", "weight": 1.5}"#;
        assert_eq!(page_number_from_payload(json), 7);
    }

    #[test]
    fn test_malformed_bag_degrades_to_zero() {
        assert_eq!(page_number_from_payload("not json"), 0);
        assert_eq!(page_number_from_payload("{}"), 0);
        assert_eq!(page_number_from_payload(r#"{"page_number": "three"}"#), 0);
    }
}
