//! Chunk embeddings and cosine ranking.
//!
//! Backends fetch candidate chunks with the folder allow-list applied inside
//! the query itself; [`rank`] then scores, thresholds, orders and truncates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Stored chunk ────────────────────────────────────────────────────────────

/// One embedded slice of a document. `(document_id, chunk_index)` is unique
/// and `chunk_index` follows the original document order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
  pub embedding_id: Uuid,
  pub document_id:  Uuid,
  pub chunk_index:  u32,
  pub chunk_text:   String,
  #[serde(skip_serializing, default)]
  pub vector:       Vec<f32>,
  pub metadata:     serde_json::Value,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::DocumentStore::replace_embeddings`]. The index is
/// the position in the supplied vector.
#[derive(Debug, Clone)]
pub struct NewEmbedding {
  pub chunk_text: String,
  pub vector:     Vec<f32>,
  pub metadata:   serde_json::Value,
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::DocumentStore::search_similar`].
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
  pub vector:         Vec<f32>,
  /// Hard pre-filter: only chunks of documents in these folders are scored.
  pub folder_ids:     Vec<Uuid>,
  pub limit:          usize,
  pub min_similarity: f32,
}

/// A chunk joined with its document and folder, before scoring.
#[derive(Debug, Clone)]
pub struct Candidate {
  pub embedding:     Embedding,
  pub document_name: String,
  pub folder_id:     Uuid,
  pub folder_name:   String,
}

/// A retrieval hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
  pub embedding:     Embedding,
  pub document_name: String,
  pub folder_id:     Uuid,
  pub folder_name:   String,
  /// `1 - cosine_distance`.
  pub score:         f32,
}

/// Cosine similarity, or `None` when the vectors are incomparable (different
/// dimensionality, empty, or zero-length).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
  if a.len() != b.len() || a.is_empty() {
    return None;
  }
  let mut dot = 0.0_f32;
  let mut norm_a = 0.0_f32;
  let mut norm_b = 0.0_f32;
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    norm_a += x * x;
    norm_b += y * y;
  }
  if norm_a == 0.0 || norm_b == 0.0 {
    return None;
  }
  Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Score `candidates` against `query`, drop everything below
/// `query.min_similarity`, order by descending score and keep `query.limit`.
///
/// Candidates whose folder is not in `query.folder_ids` are discarded as
/// well; backends are expected to have filtered already.
pub fn rank(
  query: &SimilarityQuery,
  candidates: impl IntoIterator<Item = Candidate>,
) -> Vec<ScoredChunk> {
  let mut hits: Vec<ScoredChunk> = candidates
    .into_iter()
    .filter(|c| query.folder_ids.contains(&c.folder_id))
    .filter_map(|c| {
      let score = cosine_similarity(&query.vector, &c.embedding.vector)?;
      (score >= query.min_similarity).then_some(ScoredChunk {
        embedding: c.embedding,
        document_name: c.document_name,
        folder_id: c.folder_id,
        folder_name: c.folder_name,
        score,
      })
    })
    .collect();

  // Stable sort keeps insertion order among equal scores.
  hits.sort_by(|a, b| b.score.total_cmp(&a.score));
  hits.truncate(query.limit);
  hits
}
