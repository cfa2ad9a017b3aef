//! Content sniffing/normalization and deterministic fixed-size chunking
//! with overlap (spec §4.10).

use nexus_core::model::ContentType;
use nexus_core::{NexusError, Result};

pub const CHUNK_SIZE_CHARS: usize = 800;
pub const CHUNK_OVERLAP_CHARS: usize = 100;

/// Normalizes raw bytes of a declared `content_type` to plain text.
/// `application/json-text` is flattened: string leaf values are joined with
/// newlines in document order, matching how a search index would treat a
/// JSON blob that happens to carry display text.
pub fn normalize_to_text(content_type: ContentType, bytes: &[u8]) -> Result<String> {
    let raw = std::str::from_utf8(bytes).map_err(|_| NexusError::InvalidRequest { reason: "document is not valid UTF-8".into() })?;
    match content_type {
        ContentType::TextPlain | ContentType::TextMarkdown => Ok(raw.to_string()),
        ContentType::ApplicationJsonText => {
            let value: serde_json::Value =
                serde_json::from_str(raw).map_err(|e| NexusError::InvalidRequest { reason: format!("invalid json-text document: {e}") })?;
            let mut lines = Vec::new();
            flatten_json_strings(&value, &mut lines);
            Ok(lines.join("\n"))
        }
    }
}

fn flatten_json_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => items.iter().for_each(|v| flatten_json_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| flatten_json_strings(v, out)),
        _ => {}
    }
}

/// Splits `text` into fixed-size character windows with overlap; the final
/// window may be shorter. Deterministic and order-preserving so repeated
/// runs over the same text produce identical chunk boundaries.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let stride = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_normalizes_unchanged() {
        assert_eq!(normalize_to_text(ContentType::TextPlain, b"hello").unwrap(), "hello");
    }

    #[test]
    fn json_text_flattens_string_leaves_in_order() {
        let bytes = br#"{"title": "a", "body": {"sections": ["b", "c"]}}"#;
        let text = normalize_to_text(ContentType::ApplicationJsonText, bytes).unwrap();
        assert_eq!(text, "a\nb\nc");
    }

    #[test]
    fn invalid_json_text_is_rejected() {
        assert!(normalize_to_text(ContentType::ApplicationJsonText, b"not json").is_err());
    }

    #[test]
    fn chunking_overlaps_and_covers_full_text() {
        let text = "a".repeat(2000);
        let chunks = chunk_text(&text, CHUNK_SIZE_CHARS, CHUNK_OVERLAP_CHARS);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.last().unwrap().len() <= CHUNK_SIZE_CHARS, true);
        let stride = CHUNK_SIZE_CHARS - CHUNK_OVERLAP_CHARS;
        assert_eq!(chunks[1].chars().take(CHUNK_OVERLAP_CHARS).collect::<String>(), chunks[0].chars().skip(stride).collect::<String>());
    }

    #[test]
    fn short_text_produces_single_chunk() {
        let chunks = chunk_text("short", CHUNK_SIZE_CHARS, CHUNK_OVERLAP_CHARS);
        assert_eq!(chunks, vec!["short".to_string()]);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(chunk_text("", CHUNK_SIZE_CHARS, CHUNK_OVERLAP_CHARS).is_empty());
    }
}
