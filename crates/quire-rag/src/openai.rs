//! Client for an OpenAI-compatible inference API.
//!
//! Speaks `POST /v1/embeddings` and `POST /v1/chat/completions`, which is
//! enough for OpenAI itself and most self-hosted gateways.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
  model::{ChatMessage, Completer, Embedder, ModelError, Role, Sampling},
  settings::ModelSettings,
};

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct OpenAiClient {
  client:   Client,
  settings: ModelSettings,
}

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  #[serde(default)]
  index:     usize,
  embedding: Vec<f32>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
  model:       &'a str,
  messages:    Vec<ChatMessage>,
  max_tokens:  u32,
  temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ChatMessage,
}

// ── Client ──────────────────────────────────────────────────────────────────

impl OpenAiClient {
  pub fn new(settings: ModelSettings) -> Result<Self, ModelError> {
    let client = Client::builder().timeout(settings.timeout()).build()?;
    Ok(Self { client, settings })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/v1{path}", self.settings.base_url.trim_end_matches('/'))
  }

  async fn post<B: Serialize, T: DeserializeOwned>(
    &self,
    path: &str,
    body: &B,
  ) -> Result<T, ModelError> {
    let mut req = self.client.post(self.url(path)).json(body);
    if let Some(key) = &self.settings.api_key {
      req = req.bearer_auth(key);
    }

    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
      let body = resp.text().await.unwrap_or_default();
      return Err(ModelError::Status { status: status.as_u16(), body });
    }
    Ok(resp.json().await?)
  }
}

#[async_trait]
impl Embedder for OpenAiClient {
  async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, ModelError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    let expected = texts.len();

    let resp: EmbeddingResponse = self
      .post("/embeddings", &EmbeddingRequest {
        model: &self.settings.embedding_model,
        input: texts,
      })
      .await?;

    let mut data = resp.data;
    if data.len() != expected {
      return Err(ModelError::Count { expected, got: data.len() });
    }
    data.sort_by_key(|d| d.index);

    let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
    if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension()) {
      return Err(ModelError::Dimension {
        expected: self.dimension(),
        got:      bad.len(),
      });
    }
    Ok(vectors)
  }

  fn dimension(&self) -> usize { self.settings.embedding_dimension }

  fn model_name(&self) -> &str { &self.settings.embedding_model }
}

#[async_trait]
impl Completer for OpenAiClient {
  async fn complete(
    &self,
    system_prompt: &str,
    messages: Vec<ChatMessage>,
    sampling: Sampling,
  ) -> Result<String, ModelError> {
    let mut all = Vec::with_capacity(messages.len() + 1);
    all.push(ChatMessage::system(system_prompt));
    all.extend(messages);

    let resp: CompletionResponse = self
      .post("/chat/completions", &CompletionRequest {
        model:       &self.settings.chat_model,
        messages:    all,
        max_tokens:  sampling.max_tokens,
        temperature: sampling.temperature,
      })
      .await?;

    resp
      .choices
      .into_iter()
      .map(|c| c.message)
      .find(|m| m.role == Role::Assistant)
      .map(|m| m.content.trim().to_owned())
      .ok_or_else(|| ModelError::Malformed("no assistant choice in response".into()))
  }
}
