//! The `DocumentStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `quire-store-sqlite`).
//! Higher layers (`quire-rag`, `quire-api`) depend on this abstraction, not on
//! any concrete backend.
//!
//! Backends own referential integrity: deleting a folder removes its
//! descendants, their documents, embeddings and grants; deleting a document
//! removes its embeddings. Uniqueness of `(parent_id, name)` for folders,
//! `(folder_id, filename)` for documents, `(user_id, folder_id)` for grants
//! and `(document_id, chunk_index)` for embeddings is enforced by the
//! backend, never by check-then-insert in callers.

use std::future::Future;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  document::{Document, NewDocument},
  embedding::{Embedding, NewEmbedding, ScoredChunk, SimilarityQuery},
  folder::{Folder, NewFolder},
  permission::{NewPermission, Permission},
  user::User,
};

/// Document and chunk counts for a single folder (not recursive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
  pub document_count:  usize,
  pub embedding_count: usize,
}

/// Abstraction over a Quire storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  /// Create a user. Fails with a conflict if `username` is taken.
  fn add_user(
    &self,
    username: String,
    is_superuser: bool,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  fn get_user(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  fn get_user_by_username(
    &self,
    username: String,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  // ── Folders ───────────────────────────────────────────────────────────

  /// Persist a folder. Fails with a conflict if a sibling (or, for roots, a
  /// root of the same owner) already has this name.
  fn create_folder(
    &self,
    input: NewFolder,
  ) -> impl Future<Output = Result<Folder, Self::Error>> + Send + '_;

  fn get_folder(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Folder>, Self::Error>> + Send + '_;

  fn list_folders(
    &self,
  ) -> impl Future<Output = Result<Vec<Folder>, Self::Error>> + Send + '_;

  fn list_owned_folders(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Folder>, Self::Error>> + Send + '_;

  /// Fetch the folders among `ids` that exist, in no particular order.
  fn get_folders(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<Folder>, Self::Error>> + Send + '_;

  /// The folder followed by every ancestor up to its root. Empty if the
  /// folder does not exist.
  fn folder_ancestry(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<Folder>, Self::Error>> + Send + '_;

  /// Rename a folder and recompute `path` for it and every descendant in a
  /// single transaction.
  fn rename_folder(
    &self,
    id: Uuid,
    name: String,
  ) -> impl Future<Output = Result<Folder, Self::Error>> + Send + '_;

  /// Delete a folder and everything below it. Returns the documents that
  /// were removed so their blobs can be cleaned up.
  fn delete_folder(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  fn folder_stats(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<FolderStats, Self::Error>> + Send + '_;

  // ── Permissions ───────────────────────────────────────────────────────

  /// Insert the grant, or overwrite the flags and `granted_by` of the
  /// existing row for `(user_id, folder_id)`.
  fn upsert_permission(
    &self,
    input: NewPermission,
  ) -> impl Future<Output = Result<Permission, Self::Error>> + Send + '_;

  fn get_permission(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
  ) -> impl Future<Output = Result<Option<Permission>, Self::Error>> + Send + '_;

  /// Returns `false` if there was no row to delete.
  fn delete_permission(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn list_folder_permissions(
    &self,
    folder_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Permission>, Self::Error>> + Send + '_;

  fn list_user_permissions(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Permission>, Self::Error>> + Send + '_;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Persist document metadata. Fails with a bad request if the folder
  /// already holds a document with this filename.
  fn create_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  fn get_document(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  fn list_documents(
    &self,
    folder_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Most recent documents across `folder_ids`, newest first.
  fn list_documents_in(
    &self,
    folder_ids: Vec<Uuid>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Returns `false` if the document did not exist.
  fn delete_document(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Embeddings ────────────────────────────────────────────────────────

  /// Atomically replace every chunk of a document with `chunks`, indexed
  /// by position. No reader ever observes a mix of generations.
  fn replace_embeddings(
    &self,
    document_id: Uuid,
    chunks: Vec<NewEmbedding>,
  ) -> impl Future<Output = Result<Vec<Embedding>, Self::Error>> + Send + '_;

  /// All chunks of a document ordered by `chunk_index`.
  fn list_embeddings(
    &self,
    document_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Embedding>, Self::Error>> + Send + '_;

  /// Nearest chunks among documents whose folder is in
  /// `query.folder_ids`. Chunks outside the allow-list are never scored.
  fn search_similar<'a>(
    &'a self,
    query: &'a SimilarityQuery,
  ) -> impl Future<Output = Result<Vec<ScoredChunk>, Self::Error>> + Send + 'a;
}
