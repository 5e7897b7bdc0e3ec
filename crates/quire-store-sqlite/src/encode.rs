//! Encoding and decoding helpers between Rust domain types and the values
//! stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings,
//! metadata compact JSON and vectors little-endian `f32` blobs.

use chrono::{DateTime, Utc};
use quire_core::{
  document::Document,
  embedding::{Candidate, Embedding},
  folder::Folder,
  permission::{Permission, PermissionFlags},
  user::User,
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<&str>) -> Result<Option<Uuid>> {
  s.map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Vectors ─────────────────────────────────────────────────────────────────

pub fn encode_vector(v: &[f32]) -> Vec<u8> {
  v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
  if bytes.len() % 4 != 0 {
    return Err(Error::VectorBlob(bytes.len()));
  }
  Ok(
    bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}

// ─── Column lists ────────────────────────────────────────────────────────────
//
// Each list matches the field order read by the corresponding `from_row`.

pub const USER_COLUMNS: &str = "u.user_id, u.username, u.is_superuser, u.created_at";

pub const FOLDER_COLUMNS: &str =
  "f.folder_id, f.name, f.parent_id, f.owner_id, f.path, f.created_at, f.updated_at";

pub const PERMISSION_COLUMNS: &str = "p.permission_id, p.user_id, p.folder_id, \
   p.can_read, p.can_write, p.can_delete, p.is_admin, \
   p.granted_by, p.created_at, p.updated_at";

pub const DOCUMENT_COLUMNS: &str = "d.document_id, d.folder_id, d.filename, \
   d.file_type, d.file_size, d.storage_key, d.metadata, d.uploaded_by, d.created_at";

pub const EMBEDDING_COLUMNS: &str = "e.embedding_id, e.document_id, e.chunk_index, \
   e.chunk_text, e.vector, e.metadata, e.created_at";

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `users` row.
pub struct RawUser {
  pub user_id:      String,
  pub username:     String,
  pub is_superuser: bool,
  pub created_at:   String,
}

impl RawUser {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:      row.get(0)?,
      username:     row.get(1)?,
      is_superuser: row.get(2)?,
      created_at:   row.get(3)?,
    })
  }

  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:      decode_uuid(&self.user_id)?,
      username:     self.username,
      is_superuser: self.is_superuser,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `folders` row.
pub struct RawFolder {
  pub folder_id:  String,
  pub name:       String,
  pub parent_id:  Option<String>,
  pub owner_id:   String,
  pub path:       String,
  pub created_at: String,
  pub updated_at: String,
}

impl RawFolder {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      folder_id:  row.get(0)?,
      name:       row.get(1)?,
      parent_id:  row.get(2)?,
      owner_id:   row.get(3)?,
      path:       row.get(4)?,
      created_at: row.get(5)?,
      updated_at: row.get(6)?,
    })
  }

  pub fn into_folder(self) -> Result<Folder> {
    Ok(Folder {
      folder_id:  decode_uuid(&self.folder_id)?,
      name:       self.name,
      parent_id:  decode_opt_uuid(self.parent_id.as_deref())?,
      owner_id:   decode_uuid(&self.owner_id)?,
      path:       self.path,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `permissions` row.
pub struct RawPermission {
  pub permission_id: String,
  pub user_id:       String,
  pub folder_id:     String,
  pub flags:         PermissionFlags,
  pub granted_by:    Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawPermission {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      permission_id: row.get(0)?,
      user_id:       row.get(1)?,
      folder_id:     row.get(2)?,
      flags:         PermissionFlags {
        can_read:   row.get(3)?,
        can_write:  row.get(4)?,
        can_delete: row.get(5)?,
        is_admin:   row.get(6)?,
      },
      granted_by:    row.get(7)?,
      created_at:    row.get(8)?,
      updated_at:    row.get(9)?,
    })
  }

  pub fn into_permission(self) -> Result<Permission> {
    Ok(Permission {
      permission_id: decode_uuid(&self.permission_id)?,
      user_id:       decode_uuid(&self.user_id)?,
      folder_id:     decode_uuid(&self.folder_id)?,
      flags:         self.flags,
      granted_by:    decode_opt_uuid(self.granted_by.as_deref())?,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw values read directly from a `documents` row.
pub struct RawDocument {
  pub document_id: String,
  pub folder_id:   String,
  pub filename:    String,
  pub file_type:   String,
  pub file_size:   i64,
  pub storage_key: String,
  pub metadata:    String,
  pub uploaded_by: Option<String>,
  pub created_at:  String,
}

impl RawDocument {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id: row.get(0)?,
      folder_id:   row.get(1)?,
      filename:    row.get(2)?,
      file_type:   row.get(3)?,
      file_size:   row.get(4)?,
      storage_key: row.get(5)?,
      metadata:    row.get(6)?,
      uploaded_by: row.get(7)?,
      created_at:  row.get(8)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      document_id: decode_uuid(&self.document_id)?,
      folder_id:   decode_uuid(&self.folder_id)?,
      filename:    self.filename,
      file_type:   self.file_type,
      file_size:   u64::try_from(self.file_size).unwrap_or_default(),
      storage_key: self.storage_key,
      metadata:    serde_json::from_str(&self.metadata)?,
      uploaded_by: decode_opt_uuid(self.uploaded_by.as_deref())?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `embeddings` row.
pub struct RawEmbedding {
  pub embedding_id: String,
  pub document_id:  String,
  pub chunk_index:  i64,
  pub chunk_text:   String,
  pub vector:       Vec<u8>,
  pub metadata:     String,
  pub created_at:   String,
}

impl RawEmbedding {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      embedding_id: row.get(0)?,
      document_id:  row.get(1)?,
      chunk_index:  row.get(2)?,
      chunk_text:   row.get(3)?,
      vector:       row.get(4)?,
      metadata:     row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_embedding(self) -> Result<Embedding> {
    Ok(Embedding {
      embedding_id: decode_uuid(&self.embedding_id)?,
      document_id:  decode_uuid(&self.document_id)?,
      chunk_index:  u32::try_from(self.chunk_index).unwrap_or_default(),
      chunk_text:   self.chunk_text,
      vector:       decode_vector(&self.vector)?,
      metadata:     serde_json::from_str(&self.metadata)?,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// An `embeddings` row joined with its document name and folder.
pub struct RawCandidate {
  pub embedding:     RawEmbedding,
  pub document_name: String,
  pub folder_id:     String,
  pub folder_name:   String,
}

impl RawCandidate {
  /// Expects [`EMBEDDING_COLUMNS`] followed by `d.filename, f.folder_id,
  /// f.name`.
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      embedding:     RawEmbedding::from_row(row)?,
      document_name: row.get(7)?,
      folder_id:     row.get(8)?,
      folder_name:   row.get(9)?,
    })
  }

  pub fn into_candidate(self) -> Result<Candidate> {
    Ok(Candidate {
      embedding:     self.embedding.into_embedding()?,
      document_name: self.document_name,
      folder_id:     decode_uuid(&self.folder_id)?,
      folder_name:   self.folder_name,
    })
  }
}
