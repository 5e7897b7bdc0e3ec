//! Error type for `quire-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("malformed vector blob of {0} bytes")]
  VectorBlob(usize),

  /// A uniqueness constraint on folders or users was hit.
  #[error("{0}")]
  Conflict(String),

  #[error("document {0:?} already exists in this folder")]
  DuplicateDocument(String),

  #[error("folder not found: {0}")]
  FolderNotFound(Uuid),

  #[error("document not found: {0}")]
  DocumentNotFound(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for quire_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Conflict(msg) => Self::Conflict(msg),
      Error::DuplicateDocument(_) => Self::BadRequest(e.to_string()),
      Error::FolderNotFound(id) => Self::FolderNotFound(id),
      Error::DocumentNotFound(id) => Self::DocumentNotFound(id),
      other => Self::Store(Box::new(other)),
    }
  }
}

/// Whether `e` is a `UNIQUE` constraint failure.
pub(crate) fn is_unique_violation(e: &tokio_rusqlite::Error) -> bool {
  matches!(
    e,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(inner, _))
      if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}
