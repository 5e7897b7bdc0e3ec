//! Sentence-preserving text chunking with overlap.
//!
//! All lengths are counted in `char`s, not bytes.

use serde_json::json;
use uuid::Uuid;

/// A chunk of text together with the metadata stored next to its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
  pub text:     String,
  pub metadata: serde_json::Value,
}

/// Split `text` into chunks of at most `chunk_size` characters.
///
/// Sentences (ending in `.`, `!` or `?` followed by whitespace) are kept
/// whole where they fit. Each new chunk starts with up to `overlap`
/// characters from the end of the previous one, cut at a word boundary.
/// Sentences longer than `chunk_size` are split by character windows.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
  if text.trim().is_empty() || chunk_size == 0 {
    return Vec::new();
  }

  let mut chunks = Vec::new();
  let mut current = String::new();

  for sentence in sentences(text) {
    let sentence = sentence.trim();
    if sentence.is_empty() {
      continue;
    }
    let sentence_len = sentence.chars().count();

    if sentence_len > chunk_size {
      if !current.is_empty() {
        chunks.push(current.trim().to_owned());
        current.clear();
      }
      chunks.extend(split_by_chars(sentence, chunk_size, overlap));
      continue;
    }

    let current_len = current.chars().count();
    if !current.is_empty() && current_len + sentence_len > chunk_size {
      chunks.push(current.trim().to_owned());
      let tail = overlap_tail(&current, overlap);
      current = if tail.is_empty() {
        sentence.to_owned()
      } else {
        format!("{tail} {sentence}")
      };
    } else if current.is_empty() {
      current = sentence.to_owned();
    } else {
      current.push(' ');
      current.push_str(sentence);
    }
  }

  if !current.trim().is_empty() {
    chunks.push(current.trim().to_owned());
  }
  chunks
}

/// [`chunk_text`] with per-chunk metadata attached.
pub fn chunk_with_metadata(
  text: &str,
  chunk_size: usize,
  overlap: usize,
  document_id: Uuid,
  document_title: &str,
) -> Vec<Chunk> {
  let pieces = chunk_text(text, chunk_size, overlap);
  let total = pieces.len();

  pieces
    .into_iter()
    .enumerate()
    .map(|(i, text)| Chunk {
      metadata: json!({
        "chunk_index": i,
        "chunk_size": text.chars().count(),
        "total_chunks": total,
        "document_id": document_id,
        "document_title": document_title,
      }),
      text,
    })
    .collect()
}

/// Split after sentence terminators that are followed by whitespace,
/// swallowing the whitespace run.
fn sentences(text: &str) -> Vec<&str> {
  let mut out = Vec::new();
  let mut start = 0;
  let mut iter = text.char_indices().peekable();

  while let Some((i, c)) = iter.next() {
    if !matches!(c, '.' | '!' | '?') {
      continue;
    }
    let end = i + c.len_utf8();
    let mut next_start = end;
    while let Some(&(j, w)) = iter.peek() {
      if !w.is_whitespace() {
        break;
      }
      next_start = j + w.len_utf8();
      iter.next();
    }
    if next_start > end {
      out.push(&text[start..end]);
      start = next_start;
    }
  }

  if start < text.len() {
    out.push(&text[start..]);
  }
  out
}

/// Fixed character windows advancing by `chunk_size - overlap`.
fn split_by_chars(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
  let chars: Vec<char> = text.chars().collect();
  let step = chunk_size.saturating_sub(overlap).max(1);
  let mut out = Vec::new();
  let mut start = 0;

  while start < chars.len() {
    let end = (start + chunk_size).min(chars.len());
    let piece: String = chars[start..end].iter().collect();
    let piece = piece.trim();
    if !piece.is_empty() {
      out.push(piece.to_owned());
    }
    if end == chars.len() {
      break;
    }
    start += step;
  }
  out
}

/// The last `overlap` characters of `text`, starting after the first space
/// so no word is cut in half.
fn overlap_tail(text: &str, overlap: usize) -> String {
  let len = text.chars().count();
  if len <= overlap {
    return text.to_owned();
  }
  let tail: String = text.chars().skip(len - overlap).collect();
  match tail.find(' ') {
    Some(i) if i > 0 => tail[i + 1..].to_owned(),
    _ => tail,
  }
}
