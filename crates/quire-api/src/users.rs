//! Handlers for `/users` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/users/find?username=bob` | Exact match; any authenticated user |

use axum::{
  Json,
  extract::{Query, State},
};
use quire_core::store::DocumentStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser, error::{ApiError, Result}};

#[derive(Debug, Deserialize)]
pub struct FindParams {
  pub username: Option<String>,
}

/// Enough of a user to address a permission grant to.
#[derive(Debug, Serialize)]
pub struct UserRef {
  pub id:       Uuid,
  pub username: String,
}

/// `GET /users/find`
pub async fn find<S: DocumentStore + 'static>(
  State(state): State<AppState<S>>,
  _user: CurrentUser,
  Query(params): Query<FindParams>,
) -> Result<Json<UserRef>> {
  let username = params
    .username
    .map(|u| u.trim().to_owned())
    .filter(|u| !u.is_empty())
    .ok_or_else(|| quire_core::Error::bad_request("username must be provided"))?;

  let user = state
    .store()
    .get_user_by_username(username.clone())
    .await
    .map_err(Into::<quire_core::Error>::into)?
    .ok_or_else(|| ApiError::NotFound(format!("user {username:?} not found")))?;

  Ok(Json(UserRef { id: user.user_id, username: user.username }))
}
