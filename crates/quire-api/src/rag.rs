//! Handlers for `/rag` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/rag/query` | Body: [`RagQuery`] |
//! | `POST` | `/rag/chat` | Body: [`ChatRequest`] |
//! | `GET`  | `/rag/folders` | Queryable folders |
//! | `POST` | `/rag/suggest-queries` | Never fails on model errors |
//! | `GET`  | `/rag/health` | Per-user readiness summary |

use axum::{Json, extract::State};
use quire_core::store::DocumentStore;
use quire_rag::types::{
  ChatRequest, ChatResponse, QueryableFolder, RagHealth, RagQuery, RagResponse,
  SuggestRequest, Suggestions,
};

use crate::{AppState, auth::CurrentUser, error::Result};

/// `POST /rag/query`
pub async fn query<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Json(body): Json<RagQuery>,
) -> Result<Json<RagResponse>> {
  Ok(Json(state.rag.query(user.user_id, body).await?))
}

/// `POST /rag/chat`
pub async fn chat<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
  Ok(Json(state.rag.chat(user.user_id, body).await?))
}

/// `GET /rag/folders`
pub async fn folders<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<Json<Vec<QueryableFolder>>> {
  Ok(Json(state.rag.queryable_folders(user.user_id).await?))
}

/// `POST /rag/suggest-queries`
pub async fn suggest<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Json(body): Json<SuggestRequest>,
) -> Json<Suggestions> {
  let suggestions = state
    .rag
    .suggest_related_queries(user.user_id, &body.original_query, body.folder_ids.as_deref())
    .await;
  Json(Suggestions { suggestions })
}

/// `GET /rag/health`
pub async fn health<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<Json<RagHealth>> {
  Ok(Json(state.rag.health(user.user_id).await?))
}
