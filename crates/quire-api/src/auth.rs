//! HTTP Basic authentication against the configured accounts.
//!
//! Each account maps, by username, to a [`User`] row in the store; the
//! [`CurrentUser`] extractor yields that row's id.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use quire_core::{store::DocumentStore, user::User};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// A login accepted by this server instance.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  #[serde(default)]
  pub is_superuser:  bool,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
  pub user_id:  Uuid,
  pub username: String,
}

/// Find the account whose credentials are in `headers`.
pub fn verify_auth<'a>(
  headers: &HeaderMap,
  accounts: &'a [Account],
) -> Result<&'a Account, ApiError> {
  let header_val = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

  let account = accounts
    .iter()
    .find(|a| a.username == username)
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash =
    PasswordHash::new(&account.password_hash).map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(account)
}

impl<S> FromRequestParts<AppState<S>> for CurrentUser
where
  S: DocumentStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let account = verify_auth(&parts.headers, &state.accounts)?;
    let user = state
      .store()
      .get_user_by_username(account.username.clone())
      .await
      .map_err(Into::<quire_core::Error>::into)?
      .ok_or(ApiError::Unauthorized)?;

    Ok(CurrentUser { user_id: user.user_id, username: user.username })
  }
}

/// Make sure every account has a user row. Existing rows are left as they
/// are.
pub async fn ensure_accounts<S: DocumentStore>(
  store: &S,
  accounts: &[Account],
) -> quire_core::Result<Vec<User>> {
  let mut users = Vec::with_capacity(accounts.len());
  for account in accounts {
    let existing = store
      .get_user_by_username(account.username.clone())
      .await
      .map_err(Into::<quire_core::Error>::into)?;
    let user = match existing {
      Some(user) => {
        if user.is_superuser != account.is_superuser {
          tracing::warn!(
            username = %account.username,
            "configured superuser flag differs from the stored user; keeping the stored value"
          );
        }
        user
      }
      None => {
        let user = store
          .add_user(account.username.clone(), account.is_superuser)
          .await
          .map_err(Into::<quire_core::Error>::into)?;
        tracing::info!(username = %user.username, user_id = %user.user_id, "created user for account");
        user
      }
    };
    users.push(user);
  }
  Ok(users)
}
