//! Document upload and embedding generation.
//!
//! Upload writes the blob first and the row second; a failed row insert
//! removes the blob again. Embedding generation reads the blob back,
//! extracts and chunks the text, embeds every chunk and swaps the document's
//! chunk set in one transaction.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use quire_core::{
  Error, Result,
  access::AccessControl,
  document::{Document, EmbeddingStats, NewDocument, file_type_of, storage_key},
  embedding::NewEmbedding,
  permission::Capability,
  store::DocumentStore,
};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
  blob::BlobStore,
  chunk::chunk_with_metadata,
  extract::{extract_text, is_supported},
  model::{Embedder, embed_in_batches},
  settings::RagSettings,
};

pub struct Ingestor<S> {
  access:   AccessControl<S>,
  blobs:    Arc<dyn BlobStore>,
  embedder: Arc<dyn Embedder>,
  settings: RagSettings,
  timeout:  Duration,
}

impl<S> Clone for Ingestor<S> {
  fn clone(&self) -> Self {
    Self {
      access:   self.access.clone(),
      blobs:    Arc::clone(&self.blobs),
      embedder: Arc::clone(&self.embedder),
      settings: self.settings.clone(),
      timeout:  self.timeout,
    }
  }
}

impl<S: DocumentStore> Ingestor<S> {
  pub fn new(
    access: AccessControl<S>,
    blobs: Arc<dyn BlobStore>,
    embedder: Arc<dyn Embedder>,
    settings: RagSettings,
    timeout: Duration,
  ) -> Self {
    Self { access, blobs, embedder, settings, timeout }
  }

  fn store(&self) -> &S { self.access.store() }

  pub fn settings(&self) -> &RagSettings { &self.settings }

  /// Load a document the user holds `capability` on. Missing and forbidden
  /// documents look the same to everyone but superusers.
  async fn authorized(
    &self,
    user_id: Uuid,
    document_id: Uuid,
    capability: Capability,
  ) -> Result<Document> {
    let doc = self.store().get_document(document_id).await.map_err(Into::<Error>::into)?;
    match doc {
      Some(doc) => {
        self.access.check_access(user_id, doc.folder_id, capability).await?;
        Ok(doc)
      }
      None if self.access.is_superuser(user_id).await? => {
        Err(Error::DocumentNotFound(document_id))
      }
      None => Err(Error::denied(format!(
        "you don't have {capability} permission for this document"
      ))),
    }
  }

  // ── Upload ────────────────────────────────────────────────────────────────

  /// Store `bytes` as `filename` in `folder_id`. Embeddings are not generated
  /// here; call [`regenerate_embeddings`](Self::regenerate_embeddings).
  pub async fn upload(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
    filename: &str,
    bytes: Bytes,
  ) -> Result<Document> {
    self
      .access
      .check_access(user_id, folder_id, Capability::Write)
      .await?;
    // Superusers pass the check without the folder being loaded.
    self
      .store()
      .get_folder(folder_id)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or(Error::FolderNotFound(folder_id))?;

    let filename = filename.trim();
    if filename.is_empty() || filename.contains(['/', '\\']) {
      return Err(Error::bad_request("invalid filename"));
    }
    if bytes.is_empty() {
      return Err(Error::bad_request("file is empty"));
    }
    if bytes.len() as u64 > self.settings.max_upload_bytes {
      return Err(Error::bad_request(format!(
        "file exceeds the {} byte upload limit",
        self.settings.max_upload_bytes
      )));
    }
    let file_type = file_type_of(filename)
      .ok_or_else(|| Error::bad_request("file has no extension"))?;
    if !is_supported(&file_type) {
      return Err(Error::Unsupported(file_type));
    }

    let document_id = Uuid::new_v4();
    let key = storage_key(document_id, filename);
    let file_hash = hex::encode(Sha256::digest(&bytes));
    let file_size = bytes.len() as u64;

    self.blobs.put(&key, bytes).await?;

    let created: Result<Document> = self
      .store()
      .create_document(NewDocument {
        document_id,
        folder_id,
        filename: filename.to_owned(),
        file_type,
        file_size,
        storage_key: key.clone(),
        metadata: json!({
          "file_hash": file_hash,
          "original_filename": filename,
        }),
        uploaded_by: user_id,
      })
      .await
      .map_err(Into::into);

    match created {
      Ok(doc) => {
        tracing::info!(%document_id, %folder_id, filename, file_size, "uploaded document");
        Ok(doc)
      }
      Err(e) => {
        if let Err(cleanup) = self.blobs.delete(&key).await {
          tracing::warn!(%key, error = %cleanup, "failed to remove orphaned blob");
        }
        Err(e)
      }
    }
  }

  // ── Embeddings ────────────────────────────────────────────────────────────

  /// Rebuild every chunk of a document from its stored bytes. Returns the
  /// number of chunks written.
  pub async fn regenerate_embeddings(&self, document_id: Uuid) -> Result<usize> {
    let doc = self
      .store()
      .get_document(document_id)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or(Error::DocumentNotFound(document_id))?;

    let bytes = self.blobs.get(&doc.storage_key).await?;
    let file_type = doc.file_type.clone();
    let text = tokio::task::spawn_blocking(move || extract_text(&bytes, &file_type))
      .await
      .map_err(|e| Error::bad_request(format!("text extraction failed: {e}")))??;

    let chunks = chunk_with_metadata(
      &text,
      self.settings.chunk_size,
      self.settings.chunk_overlap,
      document_id,
      &doc.filename,
    );
    if chunks.is_empty() {
      return Err(Error::bad_request("document contains no extractable text"));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_in_batches(
      self.embedder.as_ref(),
      texts,
      self.settings.embed_batch_size,
      self.timeout,
    )
    .await?;

    let rows: Vec<NewEmbedding> = chunks
      .into_iter()
      .zip(vectors)
      .map(|(chunk, vector)| NewEmbedding {
        chunk_text: chunk.text,
        vector,
        metadata: chunk.metadata,
      })
      .collect();
    let count = rows.len();

    self
      .store()
      .replace_embeddings(document_id, rows)
      .await
      .map_err(Into::<Error>::into)?;

    tracing::info!(%document_id, chunks = count, model = self.embedder.model_name(), "generated embeddings");
    Ok(count)
  }

  /// Generate embeddings on a background task. Failures are logged; the
  /// document stays without chunks until reprocessed.
  pub fn spawn_regenerate(&self, document_id: Uuid) -> tokio::task::JoinHandle<()>
  where
    S: 'static,
  {
    let this = self.clone();
    tokio::spawn(async move {
      if let Err(e) = this.regenerate_embeddings(document_id).await {
        tracing::warn!(%document_id, error = %e, "background embedding generation failed");
      }
    })
  }

  /// Regenerate on request of a user holding `write`.
  pub async fn reprocess(&self, user_id: Uuid, document_id: Uuid) -> Result<usize> {
    self.authorized(user_id, document_id, Capability::Write).await?;
    self.regenerate_embeddings(document_id).await
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn get(&self, user_id: Uuid, document_id: Uuid) -> Result<Document> {
    self.authorized(user_id, document_id, Capability::Read).await
  }

  pub async fn download(&self, user_id: Uuid, document_id: Uuid) -> Result<(Document, Bytes)> {
    let doc = self.authorized(user_id, document_id, Capability::Read).await?;
    let bytes = self.blobs.get(&doc.storage_key).await?;
    Ok((doc, bytes))
  }

  pub async fn list(&self, user_id: Uuid, folder_id: Uuid) -> Result<Vec<Document>> {
    self
      .access
      .check_access(user_id, folder_id, Capability::Read)
      .await?;
    self.store().list_documents(folder_id).await.map_err(Into::into)
  }

  pub async fn embedding_stats(
    &self,
    user_id: Uuid,
    document_id: Uuid,
  ) -> Result<EmbeddingStats> {
    self.authorized(user_id, document_id, Capability::Read).await?;
    let chunks = self
      .store()
      .list_embeddings(document_id)
      .await
      .map_err(Into::<Error>::into)?;

    let total_chunks = chunks.len();
    let total_characters: usize = chunks.iter().map(|c| c.chunk_text.chars().count()).sum();
    Ok(EmbeddingStats {
      total_chunks,
      total_characters,
      average_chunk_size: total_characters.checked_div(total_chunks).unwrap_or(0),
    })
  }

  // ── Deletion ──────────────────────────────────────────────────────────────

  pub async fn delete(&self, user_id: Uuid, document_id: Uuid) -> Result<()> {
    let doc = self.authorized(user_id, document_id, Capability::Delete).await?;
    self
      .store()
      .delete_document(document_id)
      .await
      .map_err(Into::<Error>::into)?;
    self.remove_blobs(std::slice::from_ref(&doc)).await;
    tracing::info!(%document_id, "deleted document");
    Ok(())
  }

  /// Best-effort removal of the blobs behind already-deleted documents.
  pub async fn remove_blobs(&self, documents: &[Document]) {
    for doc in documents {
      if let Err(e) = self.blobs.delete(&doc.storage_key).await {
        tracing::warn!(key = %doc.storage_key, error = %e, "failed to delete blob");
      }
    }
  }
}
