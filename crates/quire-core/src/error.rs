//! Error types for `quire-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("folder not found: {0}")]
  FolderNotFound(Uuid),

  #[error("document not found: {0}")]
  DocumentNotFound(Uuid),

  #[error("user not found: {0}")]
  UserNotFound(Uuid),

  #[error("permission denied: {0}")]
  PermissionDenied(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unsupported file type: {0:?}")]
  Unsupported(String),

  /// An external service (embedding, completion, blob storage) failed.
  #[error("upstream service error: {0}")]
  Upstream(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Coarse classification used at API boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  PermissionDenied,
  BadRequest,
  Conflict,
  Internal,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::FolderNotFound(_)
      | Self::DocumentNotFound(_)
      | Self::UserNotFound(_) => ErrorKind::NotFound,
      Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
      Self::BadRequest(_) | Self::Unsupported(_) | Self::Upstream(_) => {
        ErrorKind::BadRequest
      }
      Self::Conflict(_) => ErrorKind::Conflict,
      Self::Serialization(_) | Self::Store(_) => ErrorKind::Internal,
    }
  }

  pub fn denied(message: impl Into<String>) -> Self {
    Self::PermissionDenied(message.into())
  }

  pub fn bad_request(message: impl Into<String>) -> Self {
    Self::BadRequest(message.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
