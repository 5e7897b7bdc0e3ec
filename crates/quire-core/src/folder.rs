//! Folders and the in-memory arena used to walk the hierarchy.
//!
//! Folders form a tree through `parent_id`. The `path` column is a cache of
//! `{parent.path}/{name}` computed whenever a folder is created or renamed;
//! it is never accepted as input.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Folder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
  pub folder_id:  Uuid,
  pub name:       String,
  pub parent_id:  Option<Uuid>,
  pub owner_id:   Uuid,
  /// Materialised `/root/child/...` path.
  pub path:       String,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Input to [`crate::store::DocumentStore::create_folder`].
#[derive(Debug, Clone)]
pub struct NewFolder {
  pub name:      String,
  pub parent_id: Option<Uuid>,
  pub owner_id:  Uuid,
  pub path:      String,
}

/// Reject names that would corrupt the materialised path.
pub fn validate_name(name: &str) -> Result<()> {
  let trimmed = name.trim();
  if trimmed.is_empty() {
    return Err(Error::bad_request("folder name must not be empty"));
  }
  if trimmed.contains('/') {
    return Err(Error::bad_request("folder name must not contain '/'"));
  }
  if trimmed.chars().count() > 255 {
    return Err(Error::bad_request("folder name is longer than 255 characters"));
  }
  Ok(())
}

/// Compute the materialised path for a folder named `name` under `parent`.
pub fn child_path(parent: Option<&Folder>, name: &str) -> String {
  join_path(parent.map(|p| p.path.as_str()), name)
}

/// [`child_path`] when only the parent's path is at hand.
pub fn join_path(parent_path: Option<&str>, name: &str) -> String {
  match parent_path {
    Some(p) => format!("{}/{name}", p.trim_end_matches('/')),
    None => format!("/{name}"),
  }
}

// ─── Arena ───────────────────────────────────────────────────────────────────

/// An id-indexed snapshot of (part of) the folder hierarchy.
///
/// All walks are iterative and carry a visited set, so a corrupted parent
/// link can never recurse without bound.
#[derive(Debug, Clone, Default)]
pub struct FolderTree {
  nodes:    HashMap<Uuid, Folder>,
  children: HashMap<Uuid, Vec<Uuid>>,
}

impl FolderTree {
  pub fn new(folders: impl IntoIterator<Item = Folder>) -> Self {
    let mut tree = Self::default();
    for folder in folders {
      tree.insert(folder);
    }
    tree
  }

  pub fn insert(&mut self, folder: Folder) {
    if let Some(parent) = folder.parent_id {
      self.children.entry(parent).or_default().push(folder.folder_id);
    }
    self.nodes.insert(folder.folder_id, folder);
  }

  pub fn get(&self, id: Uuid) -> Option<&Folder> { self.nodes.get(&id) }

  /// The folder itself followed by each ancestor up to the root.
  ///
  /// Fails with [`Error::FolderNotFound`] if `id` or any referenced parent is
  /// missing from the snapshot.
  pub fn ancestry(&self, id: Uuid) -> Result<Vec<&Folder>> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut cursor = Some(id);

    while let Some(current) = cursor {
      if !seen.insert(current) {
        tracing::warn!(folder_id = %current, "cycle in folder hierarchy");
        break;
      }
      let folder = self.nodes.get(&current).ok_or(Error::FolderNotFound(current))?;
      chain.push(folder);
      cursor = folder.parent_id;
    }

    Ok(chain)
  }

  /// Every folder strictly below `id`, breadth-first.
  pub fn descendants(&self, id: Uuid) -> Vec<Uuid> {
    let mut out = Vec::new();
    let mut seen = HashSet::from([id]);
    let mut queue = VecDeque::from([id]);

    while let Some(current) = queue.pop_front() {
      for child in self.children.get(&current).into_iter().flatten() {
        if seen.insert(*child) {
          out.push(*child);
          queue.push_back(*child);
        }
      }
    }

    out
  }

  /// `roots` plus all of their descendants, deduplicated.
  pub fn expand(&self, roots: impl IntoIterator<Item = Uuid>) -> HashSet<Uuid> {
    let mut out = HashSet::new();
    for root in roots {
      if out.insert(root) {
        out.extend(self.descendants(root));
      }
    }
    out
  }
}
