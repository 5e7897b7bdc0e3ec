//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use quire_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unauthorized")]
  Unauthorized,

  #[error("not found: {0}")]
  NotFound(String),

  #[error(transparent)]
  Core(#[from] quire_core::Error),
}

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "authentication required" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"quire\""),
        );
        return res;
      }
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Core(e) => match e.kind() {
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, e.to_string()),
        ErrorKind::PermissionDenied => (StatusCode::FORBIDDEN, e.to_string()),
        ErrorKind::BadRequest => (StatusCode::BAD_REQUEST, e.to_string()),
        ErrorKind::Conflict => (StatusCode::CONFLICT, e.to_string()),
        ErrorKind::Internal => {
          tracing::error!(error = %e, "internal error while handling request");
          (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
        }
      },
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
