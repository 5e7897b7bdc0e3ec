//! Request and response shapes of the query surface.

use quire_core::{Error, Result, embedding::ScoredChunk};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ChatMessage, Role};

pub const MAX_QUERY_CHARS: usize = 1000;
pub const MAX_MESSAGE_CHARS: usize = 10_000;
pub const MAX_MESSAGES: usize = 100;
pub const MAX_LIMIT: usize = 50;

fn default_limit() -> usize { 10 }

fn default_min_relevance() -> f32 { 0.7 }

fn validate_retrieval(limit: usize, min_relevance_score: f32) -> Result<()> {
  if !(1..=MAX_LIMIT).contains(&limit) {
    return Err(Error::bad_request(format!("limit must be between 1 and {MAX_LIMIT}")));
  }
  if !(0.0..=1.0).contains(&min_relevance_score) {
    return Err(Error::bad_request("min_relevance_score must be between 0 and 1"));
  }
  Ok(())
}

// ─── Query ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagQuery {
  pub query:               String,
  /// Narrow the search to these folders; all accessible folders otherwise.
  #[serde(default)]
  pub folder_ids:          Option<Vec<Uuid>>,
  #[serde(default = "default_limit")]
  pub limit:               usize,
  #[serde(default = "default_min_relevance")]
  pub min_relevance_score: f32,
}

impl RagQuery {
  pub fn new(query: impl Into<String>) -> Self {
    Self {
      query:               query.into(),
      folder_ids:          None,
      limit:               default_limit(),
      min_relevance_score: default_min_relevance(),
    }
  }

  pub fn validate(&self) -> Result<()> {
    let len = self.query.trim().chars().count();
    if len == 0 || self.query.chars().count() > MAX_QUERY_CHARS {
      return Err(Error::bad_request(format!(
        "query must be between 1 and {MAX_QUERY_CHARS} characters"
      )));
    }
    validate_retrieval(self.limit, self.min_relevance_score)
  }
}

/// One retrieved chunk, as cited in an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagChunk {
  pub document_id:     Uuid,
  pub document_name:   String,
  pub folder_id:       Uuid,
  pub folder_name:     String,
  pub chunk_text:      String,
  pub relevance_score: f32,
  pub metadata:        serde_json::Value,
}

impl From<ScoredChunk> for RagChunk {
  fn from(hit: ScoredChunk) -> Self {
    Self {
      document_id:     hit.embedding.document_id,
      document_name:   hit.document_name,
      folder_id:       hit.folder_id,
      folder_name:     hit.folder_name,
      chunk_text:      hit.embedding.chunk_text,
      relevance_score: hit.score,
      metadata:        hit.embedding.metadata,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagResponse {
  pub query:           String,
  pub answer:          String,
  pub sources:         Vec<RagChunk>,
  pub total_chunks:    usize,
  /// Seconds.
  pub processing_time: f64,
}

// ─── Chat ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
  pub messages:            Vec<ChatMessage>,
  pub folder_ids:          Vec<Uuid>,
  #[serde(default = "default_limit")]
  pub limit:               usize,
  #[serde(default = "default_min_relevance")]
  pub min_relevance_score: f32,
}

impl ChatRequest {
  pub fn validate(&self) -> Result<()> {
    if self.messages.is_empty() || self.messages.len() > MAX_MESSAGES {
      return Err(Error::bad_request(format!(
        "messages must hold between 1 and {MAX_MESSAGES} entries"
      )));
    }
    for m in &self.messages {
      let len = m.content.chars().count();
      if m.content.trim().is_empty() || len > MAX_MESSAGE_CHARS {
        return Err(Error::bad_request(format!(
          "message content must be between 1 and {MAX_MESSAGE_CHARS} characters"
        )));
      }
    }
    if self.messages.last().map(|m| m.role) != Some(Role::User) {
      return Err(Error::bad_request("the last message must come from the user"));
    }
    if self.folder_ids.is_empty() {
      return Err(Error::bad_request("at least one folder id is required"));
    }
    validate_retrieval(self.limit, self.min_relevance_score)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
  pub role:               Role,
  pub content:            String,
  pub sources:            Vec<RagChunk>,
  pub total_chunks:       usize,
  pub processing_time:    f64,
  /// Present only when the retrieval query differs from the user's message.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reformulated_query: Option<String>,
}

// ─── Folders, suggestions, health ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryableFolder {
  pub id:              Uuid,
  pub name:            String,
  pub path:            String,
  pub document_count:  usize,
  pub embedding_count: usize,
  /// Whether the folder holds any embedded chunk.
  pub can_query:       bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestRequest {
  pub original_query: String,
  #[serde(default)]
  pub folder_ids:     Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestions {
  pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RagHealth {
  pub status:             String,
  pub user_id:            Uuid,
  pub accessible_folders: usize,
  pub queryable_folders:  usize,
  pub total_documents:    usize,
  pub total_embeddings:   usize,
  pub can_query:          bool,
}
