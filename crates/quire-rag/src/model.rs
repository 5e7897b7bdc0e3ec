//! Model-inference seams: embedding and chat completion.

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  System,
  User,
  Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role:    Role,
  pub content: String,
}

impl ChatMessage {
  pub fn system(content: impl Into<String>) -> Self {
    Self { role: Role::System, content: content.into() }
  }

  pub fn user(content: impl Into<String>) -> Self {
    Self { role: Role::User, content: content.into() }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self { role: Role::Assistant, content: content.into() }
  }
}

/// Sampling knobs for one completion call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
  pub max_tokens:  u32,
  pub temperature: f32,
}

#[derive(Debug, Error)]
pub enum ModelError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("model service returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("malformed model response: {0}")]
  Malformed(String),

  #[error("expected {expected} embeddings, got {got}")]
  Count { expected: usize, got: usize },

  #[error("embedding dimension mismatch: expected {expected}, got {got}")]
  Dimension { expected: usize, got: usize },

  #[error("model call timed out after {0:?}")]
  Timeout(Duration),
}

impl From<ModelError> for quire_core::Error {
  fn from(e: ModelError) -> Self { Self::Upstream(e.to_string()) }
}

/// Turns texts into fixed-dimension vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ModelError>;

  fn dimension(&self) -> usize;

  fn model_name(&self) -> &str;
}

/// Produces one assistant reply.
#[async_trait]
pub trait Completer: Send + Sync {
  async fn complete(
    &self,
    system_prompt: &str,
    messages: Vec<ChatMessage>,
    sampling: Sampling,
  ) -> Result<String, ModelError>;
}

/// Bound a model call by `limit`.
pub async fn with_timeout<T>(
  limit: Duration,
  call: impl Future<Output = Result<T, ModelError>>,
) -> Result<T, ModelError> {
  tokio::time::timeout(limit, call)
    .await
    .map_err(|_| ModelError::Timeout(limit))?
}

/// Embed `texts` in requests of at most `batch_size`, checking that every
/// batch comes back complete and at the embedder's dimension.
pub async fn embed_in_batches(
  embedder: &dyn Embedder,
  texts: Vec<String>,
  batch_size: usize,
  limit: Duration,
) -> Result<Vec<Vec<f32>>, ModelError> {
  let mut all = Vec::with_capacity(texts.len());

  for batch in texts.chunks(batch_size.max(1)) {
    let vectors = with_timeout(limit, embedder.embed(batch.to_vec())).await?;
    if vectors.len() != batch.len() {
      return Err(ModelError::Count { expected: batch.len(), got: vectors.len() });
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != embedder.dimension()) {
      return Err(ModelError::Dimension {
        expected: embedder.dimension(),
        got:      bad.len(),
      });
    }
    all.extend(vectors);
  }

  Ok(all)
}
