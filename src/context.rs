//! Context packing under a character budget.
//!
//! Retrieved chunks are rendered as source-tagged blocks in rank order
//! and accepted while the running total stays within `max_chars`. Packing
//! stops at the first block that would overflow; a later, smaller block
//! is never pulled forward, so the prompt always carries a strict prefix
//! of the ranking. Block sizes are counted in characters and exclude the
//! blank-line separators between blocks.

use crate::models::RetrievedChunk;

/// Render one retrieved chunk as a source-tagged block.
pub fn format_block(hit: &RetrievedChunk) -> String {
    format!(
        "[SOURCE: {} | {}]\n{}\n",
        hit.source_file, hit.chunk_name, hit.text
    )
}

/// Pack `results` into a single context string of at most `max_chars`
/// block characters.
pub fn pack(results: &[RetrievedChunk], max_chars: usize) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut size = 0usize;

    for hit in results {
        let block = format_block(hit);
        let len = block.chars().count();
        if size + len > max_chars {
            break;
        }
        size += len;
        blocks.push(block);
    }

    blocks.join("\n\n")
}
