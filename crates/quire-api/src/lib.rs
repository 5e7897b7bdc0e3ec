//! JSON REST API for Quire.
//!
//! Exposes an axum [`Router`] over the folder, document and RAG services,
//! backed by any [`quire_core::store::DocumentStore`]. Every route requires
//! HTTP Basic authentication; TLS and transport concerns are the caller's
//! responsibility.
//!
//! | Prefix | Module |
//! |--------|--------|
//! | `/rag/*` | [`rag`] |
//! | `/folders/*` | [`folders`] |
//! | `/documents/*` | [`documents`] |
//! | `/users/*` | [`users`] |

pub mod auth;
pub mod documents;
pub mod error;
pub mod folders;
pub mod rag;
pub mod users;


use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{delete, get, post},
};
use quire_core::{folders::FolderService, store::DocumentStore};
use quire_rag::{Ingestor, RagService};

pub use auth::{Account, CurrentUser, ensure_accounts};
pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub folders:  FolderService<S>,
  pub ingestor: Ingestor<S>,
  pub rag:      RagService<S>,
  pub accounts: Arc<Vec<Account>>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      folders:  self.folders.clone(),
      ingestor: self.ingestor.clone(),
      rag:      self.rag.clone(),
      accounts: Arc::clone(&self.accounts),
    }
  }
}

impl<S: DocumentStore> AppState<S> {
  pub fn store(&self) -> &Arc<S> { self.folders.access().store() }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: DocumentStore + 'static,
{
  let upload_limit =
    usize::try_from(state.ingestor.settings().max_upload_bytes).unwrap_or(usize::MAX);

  Router::new()
    // RAG
    .route("/rag/query", post(rag::query::<S>))
    .route("/rag/chat", post(rag::chat::<S>))
    .route("/rag/folders", get(rag::folders::<S>))
    .route("/rag/suggest-queries", post(rag::suggest::<S>))
    .route("/rag/health", get(rag::health::<S>))
    // Folders
    .route("/folders", get(folders::list::<S>).post(folders::create::<S>))
    .route(
      "/folders/{id}",
      get(folders::get_one::<S>)
        .patch(folders::rename::<S>)
        .delete(folders::delete_one::<S>),
    )
    .route(
      "/folders/{id}/permissions",
      get(folders::permissions::<S>).post(folders::grant::<S>),
    )
    .route("/folders/{id}/permissions/{user_id}", delete(folders::revoke::<S>))
    // Documents
    .route(
      "/folders/{id}/documents",
      get(documents::list::<S>)
        .post(documents::upload::<S>)
        .layer(DefaultBodyLimit::max(upload_limit)),
    )
    .route(
      "/documents/{id}",
      get(documents::get_one::<S>).delete(documents::delete_one::<S>),
    )
    .route("/documents/{id}/download", get(documents::download::<S>))
    .route("/documents/{id}/reprocess", post(documents::reprocess::<S>))
    .route("/documents/{id}/embeddings/stats", get(documents::stats::<S>))
    // Users
    .route("/users/find", get(users::find::<S>))
    .with_state(state)
}
