//! The RAG orchestrator.
//!
//! Every request resolves the caller's allow-list exactly once, up front,
//! and fails with `PermissionDenied` before any model call if it is empty.
//! The same list is used for the search no matter how long the model calls
//! take.

use std::{sync::Arc, time::Instant};

use quire_core::{
  Error, Result,
  access::{AccessControl, Scope},
  embedding::ScoredChunk,
  store::DocumentStore,
};
use uuid::Uuid;

use crate::{
  model::{ChatMessage, Completer, Embedder, Role, Sampling, with_timeout},
  reformulate::{Reformulator, latest_user_message},
  retrieval::RetrievalEngine,
  settings::{ModelSettings, RagSettings},
  types::{
    ChatRequest, ChatResponse, QueryableFolder, RagChunk, RagHealth, RagQuery,
    RagResponse,
  },
};

pub const NO_RESULTS_ANSWER: &str = "No relevant documents found for your query.";

const ANSWER_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers \
questions based on provided documents.
Use only the information from the provided context to answer questions.
If the context doesn't contain enough information to answer the question, say so clearly.
Cite the relevant documents when possible.";

const SUGGEST_SYSTEM_PROMPT: &str = "You are a helpful assistant that suggests \
related questions based on available documents.
Generate 3-5 related questions that someone might ask about the given documents.";

const MAX_SUGGESTIONS: usize = 5;
const SUGGESTION_SAMPLE_DOCS: usize = 10;

pub struct RagService<S> {
  access:       AccessControl<S>,
  retrieval:    RetrievalEngine<S>,
  embedder:     Arc<dyn Embedder>,
  completer:    Arc<dyn Completer>,
  reformulator: Reformulator,
  scope:        Scope,
  models:       ModelSettings,
}

impl<S> Clone for RagService<S> {
  fn clone(&self) -> Self {
    Self {
      access:       self.access.clone(),
      retrieval:    self.retrieval.clone(),
      embedder:     Arc::clone(&self.embedder),
      completer:    Arc::clone(&self.completer),
      reformulator: self.reformulator.clone(),
      scope:        self.scope,
      models:       self.models.clone(),
    }
  }
}

impl<S: DocumentStore> RagService<S> {
  pub fn new(
    access: AccessControl<S>,
    embedder: Arc<dyn Embedder>,
    completer: Arc<dyn Completer>,
    rag: &RagSettings,
    models: ModelSettings,
  ) -> Self {
    let reformulator =
      Reformulator::new(Arc::clone(&completer), rag.history_window, models.timeout());
    Self {
      retrieval: RetrievalEngine::new(Arc::clone(access.store())),
      access,
      embedder,
      completer,
      reformulator,
      scope: rag.scope(),
      models,
    }
  }

  pub fn access(&self) -> &AccessControl<S> { &self.access }

  // ── Allow-list ────────────────────────────────────────────────────────────

  async fn accessible_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
    Ok(
      self
        .access
        .accessible_folders_in(user_id, self.scope)
        .await?
        .into_iter()
        .map(|f| f.folder_id)
        .collect(),
    )
  }

  /// The folders this request may search: the caller's accessible set,
  /// narrowed to `requested` when that is non-empty.
  pub async fn allow_list(
    &self,
    user_id: Uuid,
    requested: Option<&[Uuid]>,
  ) -> Result<Vec<Uuid>> {
    let accessible = self.accessible_ids(user_id).await?;
    match requested {
      Some(ids) if !ids.is_empty() => {
        let mut out: Vec<Uuid> = Vec::new();
        for id in ids {
          if accessible.contains(id) && !out.contains(id) {
            out.push(*id);
          }
        }
        Ok(out)
      }
      _ => Ok(accessible),
    }
  }

  async fn gated_allow_list(
    &self,
    user_id: Uuid,
    requested: Option<&[Uuid]>,
  ) -> Result<Vec<Uuid>> {
    let allowed = self.allow_list(user_id, requested).await?;
    if allowed.is_empty() {
      tracing::debug!(%user_id, "no accessible folders for query");
      return Err(Error::denied("No accessible folders found for query"));
    }
    Ok(allowed)
  }

  // ── Pipeline ──────────────────────────────────────────────────────────────

  async fn retrieve(
    &self,
    text: &str,
    allowed: &[Uuid],
    limit: usize,
    min_similarity: f32,
  ) -> Result<Vec<ScoredChunk>> {
    let mut vectors = with_timeout(
      self.models.timeout(),
      self.embedder.embed(vec![text.to_owned()]),
    )
    .await?;
    let vector = vectors
      .pop()
      .ok_or_else(|| Error::Upstream("embedding service returned no vector".into()))?;

    self.retrieval.search(vector, allowed, limit, min_similarity).await
  }

  async fn generate_answer(&self, question: &str, hits: &[ScoredChunk]) -> Result<String> {
    let context = hits
      .iter()
      .map(|h| {
        format!(
          "Document: {}\nContent: {}\nRelevance: {:.2}\n",
          h.document_name, h.embedding.chunk_text, h.score
        )
      })
      .collect::<Vec<_>>()
      .join("\n---\n");

    let prompt = format!(
      "Based on the following context documents, please answer this question: \
       {question}\n\nContext:\n{context}\n\nAnswer:"
    );

    let answer = with_timeout(
      self.models.timeout(),
      self.completer.complete(ANSWER_SYSTEM_PROMPT, vec![ChatMessage::user(prompt)], Sampling {
        max_tokens:  self.models.max_answer_tokens,
        temperature: 0.7,
      }),
    )
    .await
    .map_err(|e| Error::Upstream(format!("failed to generate answer: {e}")))?;

    Ok(answer)
  }

  /// Embed, search and answer. Zero hits is a successful, empty answer.
  async fn answer(
    &self,
    text: &str,
    allowed: &[Uuid],
    limit: usize,
    min_similarity: f32,
  ) -> Result<(String, Vec<RagChunk>)> {
    let hits = self.retrieve(text, allowed, limit, min_similarity).await?;
    if hits.is_empty() {
      return Ok((NO_RESULTS_ANSWER.to_owned(), Vec::new()));
    }
    let answer = self.generate_answer(text, &hits).await?;
    Ok((answer, hits.into_iter().map(RagChunk::from).collect()))
  }

  // ── Operations ────────────────────────────────────────────────────────────

  pub async fn query(&self, user_id: Uuid, request: RagQuery) -> Result<RagResponse> {
    request.validate()?;
    let started = Instant::now();

    let allowed = self
      .gated_allow_list(user_id, request.folder_ids.as_deref())
      .await?;
    let (answer, sources) = self
      .answer(&request.query, &allowed, request.limit, request.min_relevance_score)
      .await?;

    tracing::info!(%user_id, sources = sources.len(), folders = allowed.len(), "answered query");
    Ok(RagResponse {
      query: request.query,
      answer,
      total_chunks: sources.len(),
      sources,
      processing_time: started.elapsed().as_secs_f64(),
    })
  }

  pub async fn chat(&self, user_id: Uuid, request: ChatRequest) -> Result<ChatResponse> {
    request.validate()?;
    let started = Instant::now();

    let allowed = self.gated_allow_list(user_id, Some(&request.folder_ids)).await?;

    let latest = latest_user_message(&request.messages)
      .ok_or_else(|| Error::bad_request("conversation has no user message"))?
      .to_owned();
    let query = self.reformulator.reformulate(&request.messages).await;

    let (content, sources) = self
      .answer(&query, &allowed, request.limit, request.min_relevance_score)
      .await?;

    tracing::info!(%user_id, sources = sources.len(), "answered chat message");
    Ok(ChatResponse {
      role: Role::Assistant,
      content,
      total_chunks: sources.len(),
      sources,
      processing_time: started.elapsed().as_secs_f64(),
      reformulated_query: (query != latest).then_some(query),
    })
  }

  pub async fn queryable_folders(&self, user_id: Uuid) -> Result<Vec<QueryableFolder>> {
    let folders = self.access.accessible_folders_in(user_id, self.scope).await?;
    let mut out = Vec::with_capacity(folders.len());

    for folder in folders {
      let stats = self
        .access
        .store()
        .folder_stats(folder.folder_id)
        .await
        .map_err(Into::<Error>::into)?;
      out.push(QueryableFolder {
        id:              folder.folder_id,
        name:            folder.name,
        path:            folder.path,
        document_count:  stats.document_count,
        embedding_count: stats.embedding_count,
        can_query:       stats.embedding_count > 0,
      });
    }
    Ok(out)
  }

  /// Up to five follow-up questions. Any failure yields an empty list.
  pub async fn suggest_related_queries(
    &self,
    user_id: Uuid,
    original_query: &str,
    folder_ids: Option<&[Uuid]>,
  ) -> Vec<String> {
    match self.try_suggest(user_id, original_query, folder_ids).await {
      Ok(suggestions) => suggestions,
      Err(e) => {
        tracing::warn!(%user_id, error = %e, "suggesting related queries failed");
        Vec::new()
      }
    }
  }

  async fn try_suggest(
    &self,
    user_id: Uuid,
    original_query: &str,
    folder_ids: Option<&[Uuid]>,
  ) -> Result<Vec<String>> {
    let allowed = self.allow_list(user_id, folder_ids).await?;
    if allowed.is_empty() {
      return Ok(Vec::new());
    }

    let titles: Vec<String> = self
      .access
      .store()
      .list_documents_in(allowed, SUGGESTION_SAMPLE_DOCS)
      .await
      .map_err(Into::<Error>::into)?
      .into_iter()
      .map(|d| d.filename)
      .collect();

    let prompt = format!(
      "Based on these available documents: {}\nAnd the original query: \
       \"{original_query}\"\n\nSuggest 3-5 related questions that someone might ask:",
      titles.join(", ")
    );

    let reply = with_timeout(
      self.models.timeout(),
      self.completer.complete(SUGGEST_SYSTEM_PROMPT, vec![ChatMessage::user(prompt)], Sampling {
        max_tokens:  200,
        temperature: 0.8,
      }),
    )
    .await?;

    Ok(parse_suggestions(&reply))
  }

  pub async fn health(&self, user_id: Uuid) -> Result<RagHealth> {
    let folders = self.queryable_folders(user_id).await?;
    let queryable = folders.iter().filter(|f| f.can_query).count();

    Ok(RagHealth {
      status: "healthy".into(),
      user_id,
      accessible_folders: folders.len(),
      queryable_folders: queryable,
      total_documents: folders.iter().map(|f| f.document_count).sum(),
      total_embeddings: folders.iter().map(|f| f.embedding_count).sum(),
      can_query: queryable > 0,
    })
  }
}

/// Pull list items out of a numbered (`1. ...`) or bulleted (`- ...`) reply.
pub fn parse_suggestions(reply: &str) -> Vec<String> {
  reply
    .lines()
    .map(str::trim)
    .filter(|line| line.starts_with(|c: char| c.is_ascii_digit() || c == '-'))
    .filter_map(|line| {
      let item = if line.starts_with('-') {
        line.trim_start_matches(['-', ' '])
      } else {
        let rest = line.trim_start_matches(|c: char| c.is_ascii_digit());
        rest.trim_start_matches(['.', ')', ' '])
      };
      let item = item.trim();
      (!item.is_empty()).then(|| item.to_owned())
    })
    .take(MAX_SUGGESTIONS)
    .collect()
}
