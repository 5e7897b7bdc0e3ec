//! Handlers for `/folders` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/folders` | Accessible folders with effective flags |
//! | `POST`   | `/folders` | Body: `{"name":"Finance","parent_id":null}` |
//! | `GET`    | `/folders/:id` | Needs `read` |
//! | `PATCH`  | `/folders/:id` | Body: `{"name":"Reports"}`; needs `write` |
//! | `DELETE` | `/folders/:id` | Needs `delete`; cascades |
//! | `GET`    | `/folders/:id/permissions` | Needs `admin` |
//! | `POST`   | `/folders/:id/permissions` | Body: `{"user_id":…,"can_read":true}` |
//! | `DELETE` | `/folders/:id/permissions/:user_id` | 404 if there was no grant |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use quire_core::{
  folder::Folder,
  folders::FolderAccess,
  permission::{Permission, PermissionFlags},
  store::DocumentStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser, error::{ApiError, Result}};

// ─── Folders ──────────────────────────────────────────────────────────────────

/// `GET /folders`
pub async fn list<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
) -> Result<Json<Vec<FolderAccess>>> {
  Ok(Json(state.folders.list(user.user_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name:      String,
  #[serde(default)]
  pub parent_id: Option<Uuid>,
}

/// `POST /folders`
pub async fn create<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse> {
  let folder = state
    .folders
    .create(user.user_id, &body.name, body.parent_id)
    .await?;
  Ok((StatusCode::CREATED, Json(folder)))
}

/// `GET /folders/:id`
pub async fn get_one<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<FolderAccess>> {
  Ok(Json(state.folders.get(user.user_id, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
  pub name: String,
}

/// `PATCH /folders/:id`
pub async fn rename<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<RenameBody>,
) -> Result<Json<Folder>> {
  Ok(Json(state.folders.rename(user.user_id, id, &body.name).await?))
}

/// `DELETE /folders/:id`
pub async fn delete_one<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode> {
  let removed = state.folders.delete(user.user_id, id).await?;
  state.ingestor.remove_blobs(&removed).await;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Permissions ──────────────────────────────────────────────────────────────

/// `GET /folders/:id/permissions`
pub async fn permissions<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Permission>>> {
  Ok(Json(state.folders.permissions(user.user_id, id).await?))
}

#[derive(Debug, Deserialize)]
pub struct GrantBody {
  pub user_id: Uuid,
  #[serde(flatten)]
  pub flags:   PermissionFlags,
}

/// `POST /folders/:id/permissions`
pub async fn grant<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<GrantBody>,
) -> Result<impl IntoResponse> {
  let permission = state
    .folders
    .access()
    .grant(user.user_id, body.user_id, id, body.flags)
    .await?;
  Ok((StatusCode::CREATED, Json(permission)))
}

/// `DELETE /folders/:id/permissions/:user_id`
pub async fn revoke<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  user: CurrentUser,
  Path((id, target)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
  let removed = state
    .folders
    .access()
    .revoke(user.user_id, target, id)
    .await?;
  if removed {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!("user {target} has no permission on folder {id}")))
  }
}
