//! Tunables for the model client and the RAG pipeline.
//!
//! Both structs deserialize with every field optional so they can be nested
//! directly in the server's layered configuration.

use std::time::Duration;

use serde::Deserialize;

/// Where and how to reach the OpenAI-compatible model service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
  pub base_url:            String,
  pub api_key:             Option<String>,
  pub embedding_model:     String,
  /// Fixed system-wide; every stored vector must have this length.
  pub embedding_dimension: usize,
  pub chat_model:          String,
  pub timeout_secs:        u64,
  pub max_answer_tokens:   u32,
}

impl Default for ModelSettings {
  fn default() -> Self {
    Self {
      base_url:            "https://api.openai.com".into(),
      api_key:             None,
      embedding_model:     "text-embedding-3-small".into(),
      embedding_dimension: 1536,
      chat_model:          "gpt-3.5-turbo".into(),
      timeout_secs:        30,
      max_answer_tokens:   500,
    }
  }
}

impl ModelSettings {
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSettings {
  /// Maximum chunk length in characters.
  pub chunk_size:          usize,
  pub chunk_overlap:       usize,
  /// Prior messages given to the reformulator as context.
  pub history_window:      usize,
  /// Widen the enumerated folder set with descendants of directly
  /// accessible folders.
  pub include_descendants: bool,
  pub max_upload_bytes:    u64,
  /// Texts per embedding request.
  pub embed_batch_size:    usize,
}

impl Default for RagSettings {
  fn default() -> Self {
    Self {
      chunk_size:          1000,
      chunk_overlap:       200,
      history_window:      5,
      include_descendants: false,
      max_upload_bytes:    50 * 1024 * 1024,
      embed_batch_size:    64,
    }
  }
}

impl RagSettings {
  pub fn scope(&self) -> quire_core::access::Scope {
    if self.include_descendants {
      quire_core::access::Scope::WithDescendants
    } else {
      quire_core::access::Scope::Direct
    }
  }
}
