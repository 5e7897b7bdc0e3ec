//! Folder-scoped nearest-chunk search.

use std::sync::Arc;

use quire_core::{
  Error, Result,
  embedding::{ScoredChunk, SimilarityQuery},
  store::DocumentStore,
};
use uuid::Uuid;

pub struct RetrievalEngine<S> {
  store: Arc<S>,
}

impl<S> Clone for RetrievalEngine<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: DocumentStore> RetrievalEngine<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Chunks from documents in `allowed_folder_ids` scoring at least
  /// `min_similarity` against `vector`, best first, at most `limit`.
  ///
  /// An empty allow-list returns nothing without touching the store.
  pub async fn search(
    &self,
    vector: Vec<f32>,
    allowed_folder_ids: &[Uuid],
    limit: usize,
    min_similarity: f32,
  ) -> Result<Vec<ScoredChunk>> {
    if allowed_folder_ids.is_empty() || limit == 0 {
      tracing::debug!("nothing to search; allow-list or limit is empty");
      return Ok(Vec::new());
    }

    let query = SimilarityQuery {
      vector,
      folder_ids: allowed_folder_ids.to_vec(),
      limit,
      min_similarity,
    };
    let hits = self.store.search_similar(&query).await.map_err(Into::<Error>::into)?;

    tracing::debug!(hits = hits.len(), folders = allowed_folder_ids.len(), "similarity search");
    Ok(hits)
  }
}
