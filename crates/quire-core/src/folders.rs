//! Folder lifecycle with capability checks applied.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  access::{AccessControl, Scope},
  document::Document,
  folder::{Folder, NewFolder, child_path, validate_name},
  permission::{Capability, Permission, PermissionFlags},
  store::DocumentStore,
};

/// A folder together with what the requesting user may do with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderAccess {
  #[serde(flatten)]
  pub folder:      Folder,
  pub is_owner:    bool,
  pub permissions: PermissionFlags,
}

pub struct FolderService<S> {
  access: AccessControl<S>,
  scope:  Scope,
}

impl<S> Clone for FolderService<S> {
  fn clone(&self) -> Self {
    Self { access: self.access.clone(), scope: self.scope }
  }
}

impl<S: DocumentStore> FolderService<S> {
  pub fn new(access: AccessControl<S>, scope: Scope) -> Self {
    Self { access, scope }
  }

  pub fn access(&self) -> &AccessControl<S> { &self.access }

  async fn load(&self, folder_id: Uuid) -> Result<Folder> {
    self
      .access
      .store()
      .get_folder(folder_id)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or(Error::FolderNotFound(folder_id))
  }

  async fn annotate(&self, user_id: Uuid, folder: Folder) -> Result<FolderAccess> {
    let permissions = self.access.effective(user_id, folder.folder_id).await?;
    Ok(FolderAccess {
      is_owner: folder.owner_id == user_id,
      folder,
      permissions,
    })
  }

  /// Create a folder owned by `user_id`. Creating under a parent requires
  /// `write` on the parent.
  pub async fn create(
    &self,
    user_id: Uuid,
    name: &str,
    parent_id: Option<Uuid>,
  ) -> Result<Folder> {
    validate_name(name)?;
    let name = name.trim().to_owned();

    let parent = match parent_id {
      Some(id) => {
        self.access.check_access(user_id, id, Capability::Write).await?;
        Some(self.load(id).await?)
      }
      None => None,
    };

    let folder = self
      .access
      .store()
      .create_folder(NewFolder {
        path: child_path(parent.as_ref(), &name),
        name,
        parent_id,
        owner_id: user_id,
      })
      .await
      .map_err(Into::<Error>::into)?;

    tracing::info!(folder_id = %folder.folder_id, path = %folder.path, "created folder");
    Ok(folder)
  }

  pub async fn rename(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
    name: &str,
  ) -> Result<Folder> {
    validate_name(name)?;
    self
      .access
      .check_access(user_id, folder_id, Capability::Write)
      .await?;

    self
      .access
      .store()
      .rename_folder(folder_id, name.trim().to_owned())
      .await
      .map_err(Into::into)
  }

  /// Delete a folder and its whole subtree. Returns the documents that went
  /// with it; their blobs are the caller's to clean up.
  pub async fn delete(&self, user_id: Uuid, folder_id: Uuid) -> Result<Vec<Document>> {
    self
      .access
      .check_access(user_id, folder_id, Capability::Delete)
      .await?;

    let removed = self
      .access
      .store()
      .delete_folder(folder_id)
      .await
      .map_err(Into::<Error>::into)?;

    tracing::info!(%folder_id, documents = removed.len(), "deleted folder");
    Ok(removed)
  }

  pub async fn get(&self, user_id: Uuid, folder_id: Uuid) -> Result<FolderAccess> {
    self
      .access
      .check_access(user_id, folder_id, Capability::Read)
      .await?;
    let folder = self.load(folder_id).await?;
    self.annotate(user_id, folder).await
  }

  /// Every folder the user can reach, with effective capabilities.
  pub async fn list(&self, user_id: Uuid) -> Result<Vec<FolderAccess>> {
    let folders = self.access.accessible_folders_in(user_id, self.scope).await?;
    let mut out = Vec::with_capacity(folders.len());
    for folder in folders {
      out.push(self.annotate(user_id, folder).await?);
    }
    Ok(out)
  }

  pub async fn permissions(
    &self,
    user_id: Uuid,
    folder_id: Uuid,
  ) -> Result<Vec<Permission>> {
    self.access.folder_permissions(user_id, folder_id).await
  }
}
