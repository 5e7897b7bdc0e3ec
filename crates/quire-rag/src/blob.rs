//! Blob storage for uploaded document bytes, keyed by storage key.

use std::{
  collections::HashMap,
  path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum BlobError {
  #[error("blob not found: {0}")]
  NotFound(String),

  #[error("invalid blob key: {0:?}")]
  InvalidKey(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

impl From<BlobError> for quire_core::Error {
  fn from(e: BlobError) -> Self { Self::Upstream(e.to_string()) }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
  async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobError>;

  async fn get(&self, key: &str) -> Result<Bytes, BlobError>;

  /// Deleting a missing key is not an error.
  async fn delete(&self, key: &str) -> Result<(), BlobError>;
}

// ─── Filesystem ──────────────────────────────────────────────────────────────

/// Stores each blob as a file below `root`, using the key as relative path.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
  root: PathBuf,
}

impl FsBlobStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  /// Keys must be relative and free of `..` so they cannot escape `root`.
  fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
    let rel = Path::new(key);
    let clean = !key.is_empty()
      && rel.components().all(|c| matches!(c, Component::Normal(_)));
    if !clean {
      return Err(BlobError::InvalidKey(key.to_owned()));
    }
    Ok(self.root.join(rel))
  }
}

#[async_trait]
impl BlobStore for FsBlobStore {
  async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobError> {
    let path = self.path_for(key)?;
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &bytes).await?;
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Bytes, BlobError> {
    let path = self.path_for(key)?;
    match tokio::fs::read(&path).await {
      Ok(data) => Ok(Bytes::from(data)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Err(BlobError::NotFound(key.to_owned()))
      }
      Err(e) => Err(e.into()),
    }
  }

  async fn delete(&self, key: &str) -> Result<(), BlobError> {
    let path = self.path_for(key)?;
    match tokio::fs::remove_file(&path).await {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
      Err(e) => return Err(e.into()),
    }
    // Drop the now-empty per-document directory; ignore anything else.
    if let Some(parent) = path.parent()
      && parent != self.root
    {
      let _ = tokio::fs::remove_dir(parent).await;
    }
    Ok(())
  }
}

// ─── In-memory ───────────────────────────────────────────────────────────────

/// A process-local blob store for tests and throwaway instances.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
  blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
  pub fn new() -> Self { Self::default() }

  pub async fn len(&self) -> usize { self.blobs.read().await.len() }

  pub async fn contains(&self, key: &str) -> bool {
    self.blobs.read().await.contains_key(key)
  }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
  async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BlobError> {
    self.blobs.write().await.insert(key.to_owned(), bytes);
    Ok(())
  }

  async fn get(&self, key: &str) -> Result<Bytes, BlobError> {
    self
      .blobs
      .read()
      .await
      .get(key)
      .cloned()
      .ok_or_else(|| BlobError::NotFound(key.to_owned()))
  }

  async fn delete(&self, key: &str) -> Result<(), BlobError> {
    self.blobs.write().await.remove(key);
    Ok(())
  }
}
