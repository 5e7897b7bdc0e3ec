//! Access resolution, enumeration and grant management.
//!
//! Resolution order for `check(user, folder, capability)`:
//! 1. Superusers pass immediately.
//! 2. The folder must exist, otherwise [`Error::FolderNotFound`].
//! 3. The folder owner passes.
//! 4. The user's own grant on the folder passes if `is_admin` or the
//!    specific bit is set.
//! 5. Otherwise repeat 2–4 on the parent, up to the root.
//!
//! Grants only ever add access on the way down; a child grant cannot revoke
//! what an ancestor grants.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use uuid::Uuid;

use crate::{
  Error, Result,
  folder::{Folder, FolderTree},
  permission::{Capability, NewPermission, Permission, PermissionFlags},
  store::DocumentStore,
};

/// Which folders count as "accessible" when enumerating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Scope {
  /// Only folders the user owns or holds an explicit grant on.
  #[default]
  Direct,
  /// Direct folders plus every descendant of them, matching what `check`
  /// allows through inheritance.
  WithDescendants,
}

/// Permission checks and grant management over a [`DocumentStore`].
pub struct AccessControl<S> {
  store: Arc<S>,
}

impl<S> Clone for AccessControl<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: DocumentStore> AccessControl<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Unknown users are treated as ordinary, unprivileged users.
  pub async fn is_superuser(&self, user_id: Uuid) -> Result<bool> {
    let user = self.store.get_user(user_id).await.map_err(Into::<Error>::into)?;
    Ok(user.is_some_and(|u| u.is_superuser))
  }

  /// Load the folder and its ancestors as an arena, failing if the folder
  /// is missing.
  async fn lineage(&self, folder_id: Uuid) -> Result<FolderTree> {
    let chain = self
      .store
      .folder_ancestry(folder_id)
      .await
      .map_err(Into::<Error>::into)?;
    if chain.is_empty() {
      return Err(Error::FolderNotFound(folder_id));
    }
    Ok(FolderTree::new(chain))
  }

  async fn grants_by_folder(
    &self,
    user_id: Uuid,
  ) -> Result<HashMap<Uuid, PermissionFlags>> {
    let grants = self
      .store
      .list_user_permissions(user_id)
      .await
      .map_err(Into::<Error>::into)?;
    Ok(grants.into_iter().map(|p| (p.folder_id, p.flags)).collect())
  }

  // ── Resolution ────────────────────────────────────────────────────────

  /// Whether `user_id` holds `capability` on `folder_id`, directly or by
  /// inheritance from an ancestor. Read-only.
  pub async fn check(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
    capability: Capability,
  ) -> Result<bool> {
    if self.is_superuser(user_id).await? {
      return Ok(true);
    }

    let tree = self.lineage(folder_id).await?;
    let grants = self.grants_by_folder(user_id).await?;

    for folder in tree.ancestry(folder_id)? {
      if folder.owner_id == user_id {
        return Ok(true);
      }
      if let Some(flags) = grants.get(&folder.folder_id)
        && flags.grants(capability)
      {
        return Ok(true);
      }
    }

    Ok(false)
  }

  /// Like [`check`](Self::check) but fails with
  /// [`Error::PermissionDenied`]. A folder that does not exist is reported
  /// exactly like one the caller may not see.
  pub async fn check_access(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
    capability: Capability,
  ) -> Result<()> {
    match self.check(user_id, folder_id, capability).await {
      Ok(true) => Ok(()),
      Ok(false) | Err(Error::FolderNotFound(_)) => Err(Error::denied(format!(
        "you don't have {capability} permission for this folder"
      ))),
      Err(e) => Err(e),
    }
  }

  /// The union of every capability the user holds on the folder, resolved
  /// the same way as [`check`](Self::check).
  pub async fn effective(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
  ) -> Result<PermissionFlags> {
    if self.is_superuser(user_id).await? {
      return Ok(PermissionFlags::ALL);
    }

    let tree = self.lineage(folder_id).await?;
    let grants = self.grants_by_folder(user_id).await?;
    let mut acc = PermissionFlags::default();

    for folder in tree.ancestry(folder_id)? {
      if folder.owner_id == user_id {
        return Ok(PermissionFlags::ALL);
      }
      if let Some(flags) = grants.get(&folder.folder_id) {
        if flags.is_admin {
          return Ok(PermissionFlags::ALL);
        }
        acc.can_read |= flags.can_read;
        acc.can_write |= flags.can_write;
        acc.can_delete |= flags.can_delete;
      }
    }

    Ok(acc)
  }

  // ── Enumeration ───────────────────────────────────────────────────────

  /// Folders the user owns or holds a non-empty grant on, deduplicated and
  /// ordered by path. Superusers get every folder.
  ///
  /// Inherited access is not included; see [`Scope::WithDescendants`].
  pub async fn accessible_folders(&self, user_id: Uuid) -> Result<Vec<Folder>> {
    if self.is_superuser(user_id).await? {
      let mut all = self.store.list_folders().await.map_err(Into::<Error>::into)?;
      all.sort_by(|a, b| a.path.cmp(&b.path));
      return Ok(all);
    }

    let owned = self
      .store
      .list_owned_folders(user_id)
      .await
      .map_err(Into::<Error>::into)?;

    let permitted_ids: Vec<Uuid> = self
      .store
      .list_user_permissions(user_id)
      .await
      .map_err(Into::<Error>::into)?
      .into_iter()
      .filter(|p| p.flags.any())
      .map(|p| p.folder_id)
      .collect();

    let permitted = if permitted_ids.is_empty() {
      Vec::new()
    } else {
      self.store.get_folders(permitted_ids).await.map_err(Into::<Error>::into)?
    };

    let mut unique: HashMap<Uuid, Folder> = HashMap::new();
    for folder in owned.into_iter().chain(permitted) {
      unique.entry(folder.folder_id).or_insert(folder);
    }

    let mut folders: Vec<Folder> = unique.into_values().collect();
    folders.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(folders)
  }

  /// [`accessible_folders`](Self::accessible_folders) widened according to
  /// `scope`.
  pub async fn accessible_folders_in(
    &self,
    user_id: Uuid,
    scope: Scope,
  ) -> Result<Vec<Folder>> {
    let direct = self.accessible_folders(user_id).await?;
    if scope == Scope::Direct {
      return Ok(direct);
    }

    let tree = FolderTree::new(self.store.list_folders().await.map_err(Into::<Error>::into)?);
    let ids: HashSet<Uuid> = tree.expand(direct.iter().map(|f| f.folder_id));
    let mut folders: Vec<Folder> = ids
      .into_iter()
      .filter_map(|id| tree.get(id).cloned())
      .collect();
    folders.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(folders)
  }

  // ── Grants ────────────────────────────────────────────────────────────

  /// Granters and revokers must be a superuser, the owner, or hold `admin`
  /// on the folder.
  async fn authorize_manage(&self, actor_id: Uuid, folder_id: Uuid) -> Result<()> {
    if self.is_superuser(actor_id).await? {
      self
        .store
        .get_folder(folder_id)
        .await
        .map_err(Into::<Error>::into)?
        .ok_or(Error::FolderNotFound(folder_id))?;
      return Ok(());
    }

    match self.check(actor_id, folder_id, Capability::Admin).await {
      Ok(true) => Ok(()),
      Ok(false) | Err(Error::FolderNotFound(_)) => Err(Error::denied(
        "you don't have permission to manage access to this folder",
      )),
      Err(e) => Err(e),
    }
  }

  /// Create or overwrite `target_id`'s grant on `folder_id`. Repeating an
  /// identical grant leaves exactly one row with the same flags.
  pub async fn grant(
    &self,
    granter_id: Uuid,
    target_id: Uuid,
    folder_id: Uuid,
    flags: PermissionFlags,
  ) -> Result<Permission> {
    self.authorize_manage(granter_id, folder_id).await?;

    self
      .store
      .get_user(target_id)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or(Error::UserNotFound(target_id))?;

    let permission = self
      .store
      .upsert_permission(NewPermission {
        user_id: target_id,
        folder_id,
        flags,
        granted_by: granter_id,
      })
      .await
      .map_err(Into::<Error>::into)?;

    tracing::info!(
      %granter_id, %target_id, %folder_id, ?flags,
      "granted folder permission"
    );
    Ok(permission)
  }

  /// Remove `target_id`'s grant on `folder_id`. Returns `false` if there was
  /// none.
  pub async fn revoke(
    &self,
    revoker_id: Uuid,
    target_id: Uuid,
    folder_id: Uuid,
  ) -> Result<bool> {
    self.authorize_manage(revoker_id, folder_id).await?;

    let removed = self
      .store
      .delete_permission(target_id, folder_id)
      .await
      .map_err(Into::<Error>::into)?;

    if removed {
      tracing::info!(%revoker_id, %target_id, %folder_id, "revoked folder permission");
    }
    Ok(removed)
  }

  /// Every grant on a folder; visible to folder administrators only.
  pub async fn folder_permissions(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
  ) -> Result<Vec<Permission>> {
    self.authorize_manage(user_id, folder_id).await?;
    self
      .store
      .list_folder_permissions(folder_id)
      .await
      .map_err(Into::into)
  }
}
