//! Sliding-window chunker (C5, spec §4.5). Splits a raw item's body into
//! overlapping windows of approximately `chunk_size` characters, snapping
//! each boundary to the nearest whitespace within `±64` chars so chunks don't
//! split mid-word. Mirrors the windowing style of the teacher's
//! `research::vector_search` passage splitter, simplified to operate on
//! `char` boundaries directly rather than a tokenizer.

use sha2::{Digest, Sha256};

use crate::models::{CharSpan, Chunk, RawItem};

/// How far a boundary may drift from the nominal cut point while searching
/// for whitespace to snap to.
const SNAP_WINDOW: usize = 64;

/// Deterministic content-addressed chunk id (spec §3): `hash(provider_tag ∥
/// url ∥ ordinal)` when the item has a URL, else `hash(text)`. Two ingest
/// runs over unchanged upstream content must produce identical ids so
/// `upsert` overwrites rather than duplicates.
fn compute_chunk_id(item: &RawItem, ordinal: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    match &item.url {
        Some(url) => {
            hasher.update(item.provider_tag.as_bytes());
            hasher.update(b"\0");
            hasher.update(url.as_bytes());
            hasher.update(b"\0");
            hasher.update(ordinal.to_le_bytes());
        }
        None => {
            hasher.update(text.as_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Split `item.body` into overlapping [`Chunk`]s.
///
/// `chunk_size` and `overlap` are in chars, not bytes; indexing is done over
/// a `Vec<char>` so multi-byte UTF-8 text chunks correctly. Returns an empty
/// vec if the body is empty after trimming (callers should have rejected
/// that via `RawItem::validate` already).
pub fn chunk(item: &RawItem, parent_raw_id: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    assert!(overlap < chunk_size, "overlap must be smaller than chunk_size");

    let chars: Vec<char> = item.body.chars().collect();
    let len = chars.len();
    if len == 0 {
        return Vec::new();
    }

    let stride = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut ordinal = 0usize;

    while start < len {
        let nominal_end = (start + chunk_size).min(len);
        let end = if nominal_end < len {
            snap_to_whitespace(&chars, nominal_end)
        } else {
            nominal_end
        };

        let text: String = chars[start..end].iter().collect();
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                chunk_id: compute_chunk_id(item, ordinal, trimmed),
                parent_raw_id: parent_raw_id.to_string(),
                ordinal,
                text: trimmed.to_string(),
                char_span: CharSpan { start, end },
            });
            ordinal += 1;
        }

        if end >= len {
            break;
        }
        start += stride;
    }

    chunks
}

/// Search outward from `nominal` within [`SNAP_WINDOW`] for a whitespace
/// char to cut on; falls back to the nominal cut if none is found nearby.
fn snap_to_whitespace(chars: &[char], nominal: usize) -> usize {
    let lo = nominal.saturating_sub(SNAP_WINDOW);
    let hi = (nominal + SNAP_WINDOW).min(chars.len());

    for offset in 0..=SNAP_WINDOW {
        if nominal + offset < hi && chars[nominal + offset].is_whitespace() {
            return nominal + offset;
        }
        if offset <= nominal - lo && nominal >= offset && chars[nominal - offset].is_whitespace() {
            return nominal - offset;
        }
    }
    nominal
}
