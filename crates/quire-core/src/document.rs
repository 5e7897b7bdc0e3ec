//! Uploaded files. Each document lives in exactly one folder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document metadata. The bytes themselves live in blob storage under
/// `storage_key`; `(folder_id, filename)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  pub document_id: Uuid,
  pub folder_id:   Uuid,
  pub filename:    String,
  /// Lower-cased extension, e.g. `"md"`.
  pub file_type:   String,
  pub file_size:   u64,
  pub storage_key: String,
  pub metadata:    serde_json::Value,
  pub uploaded_by: Option<Uuid>,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::DocumentStore::create_document`]. The id is
/// chosen by the caller so the blob can be written before the row exists.
#[derive(Debug, Clone)]
pub struct NewDocument {
  pub document_id: Uuid,
  pub folder_id:   Uuid,
  pub filename:    String,
  pub file_type:   String,
  pub file_size:   u64,
  pub storage_key: String,
  pub metadata:    serde_json::Value,
  pub uploaded_by: Uuid,
}

/// The lower-cased extension of `filename`, if it has one.
pub fn file_type_of(filename: &str) -> Option<String> {
  let (stem, ext) = filename.rsplit_once('.')?;
  if stem.is_empty() || ext.is_empty() {
    return None;
  }
  Some(ext.to_ascii_lowercase())
}

/// Blob-store key for a document's bytes.
pub fn storage_key(document_id: Uuid, filename: &str) -> String {
  format!("documents/{document_id}/{filename}")
}

/// Aggregate figures over a document's chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStats {
  pub total_chunks:       usize,
  pub total_characters:   usize,
  pub average_chunk_size: usize,
}
