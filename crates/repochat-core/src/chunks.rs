//! Splits file contents into fixed-size chunks for embedding and retrieval.
//! Chunks never overlap and never drop content: joining them gives back the file.

use serde::{Deserialize, Serialize};

use crate::files::FileRecord;

/// Default maximum characters per chunk. Keeps each chunk within one embedding call
/// while leaving enough surrounding code for the model to reason about.
pub const DEFAULT_MAX_CHARS: usize = 2000;

/// A slice of a source file, with its position in that file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Path of the file relative to the repository root.
    pub source_path: String,
    /// Index of this chunk within the file (0, 1, 2, …).
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub text: String,
}

/// Splits `content` into consecutive slices of at most `max_chars` characters.
///
/// Characters are Unicode scalar values, so multi-byte text is never cut mid-character.
/// Empty input yields no slices. A `max_chars` of 0 is treated as "no limit".
pub fn split_chars(content: &str, max_chars: usize) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 {
        return vec![content];
    }
    let mut result = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (pos, _) in content.char_indices() {
        if count == max_chars {
            result.push(&content[start..pos]);
            start = pos;
            count = 0;
        }
        count += 1;
    }
    result.push(&content[start..]);
    result
}

/// Chunk a single file's content. Every chunk carries the final `total_chunks`.
pub fn chunk_file(file: &FileRecord, max_chars: usize) -> Vec<Chunk> {
    let pieces = split_chars(&file.content, max_chars);
    let total_chunks = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            source_path: file.relative_path.clone(),
            chunk_index,
            total_chunks,
            text: text.to_string(),
        })
        .collect()
}

/// Chunk all files. Returns chunks from all files in order.
pub fn chunk_files(files: &[FileRecord], max_chars: usize) -> Vec<Chunk> {
    files.iter().flat_map(|f| chunk_file(f, max_chars)).collect()
}
