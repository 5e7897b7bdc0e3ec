//! Handlers for document endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/folders/:id/documents` | Needs `read` |
//! | `POST`   | `/folders/:id/documents?filename=…` | Raw body; needs `write` |
//! | `GET`    | `/documents/:id` | Metadata |
//! | `DELETE` | `/documents/:id` | Needs `delete` |
//! | `GET`    | `/documents/:id/download` | Original bytes |
//! | `POST`   | `/documents/:id/reprocess` | Regenerates embeddings; needs `write` |
//! | `GET`    | `/documents/:id/embeddings/stats` | Chunk statistics |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{StatusCode, header},
  response::IntoResponse,
};
use bytes::Bytes;
use quire_core::{
  document::{Document, EmbeddingStats},
  store::DocumentStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser, error::Result};

/// `GET /folders/:id/documents`
pub async fn list<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(folder_id): Path<Uuid>,
) -> Result<Json<Vec<Document>>> {
  Ok(Json(state.ingestor.list(user.user_id, folder_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
  pub filename: String,
}

/// `POST /folders/:id/documents?filename=<name>`
///
/// Embeddings are generated in the background; the response does not wait
/// for them.
pub async fn upload<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(folder_id): Path<Uuid>,
  Query(params): Query<UploadParams>,
  body: Bytes,
) -> Result<impl IntoResponse> {
  let doc = state
    .ingestor
    .upload(user.user_id, folder_id, &params.filename, body)
    .await?;
  state.ingestor.spawn_regenerate(doc.document_id);
  Ok((StatusCode::CREATED, Json(doc)))
}

/// `GET /documents/:id`
pub async fn get_one<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Document>> {
  Ok(Json(state.ingestor.get(user.user_id, id).await?))
}

/// `DELETE /documents/:id`
pub async fn delete_one<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode> {
  state.ingestor.delete(user.user_id, id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /documents/:id/download`
pub async fn download<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
  let (doc, bytes) = state.ingestor.download(user.user_id, id).await?;
  let disposition = format!("attachment; filename=\"{}\"", doc.filename.replace('"', ""));
  Ok((
    [
      (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
      (header::CONTENT_DISPOSITION, disposition),
    ],
    bytes,
  ))
}

#[derive(Debug, Serialize)]
pub struct Reprocessed {
  pub document_id: Uuid,
  pub chunks:      usize,
}

/// `POST /documents/:id/reprocess`
pub async fn reprocess<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Reprocessed>> {
  let chunks = state.ingestor.reprocess(user.user_id, id).await?;
  Ok(Json(Reprocessed { document_id: id, chunks }))
}

/// `GET /documents/:id/embeddings/stats`
pub async fn stats<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<EmbeddingStats>> {
  Ok(Json(state.ingestor.embedding_stats(user.user_id, id).await?))
}
