//! Capabilities and per-(user, folder) grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

/// The unit of access control.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Capability {
  Read,
  Write,
  Delete,
  Admin,
}

/// The four stored capability bits of a grant.
///
/// `is_admin` is a distinct bit: it is checked first and implies the other
/// three, but it is never derived from them.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub struct PermissionFlags {
  #[serde(default)]
  pub can_read:   bool,
  #[serde(default)]
  pub can_write:  bool,
  #[serde(default)]
  pub can_delete: bool,
  #[serde(default)]
  pub is_admin:   bool,
}

impl PermissionFlags {
  pub const ALL: Self = Self {
    can_read:   true,
    can_write:  true,
    can_delete: true,
    is_admin:   true,
  };

  pub const READ: Self = Self {
    can_read:   true,
    can_write:  false,
    can_delete: false,
    is_admin:   false,
  };

  /// Whether these bits alone grant `capability`.
  pub fn grants(&self, capability: Capability) -> bool {
    if self.is_admin {
      return true;
    }
    match capability {
      Capability::Read => self.can_read,
      Capability::Write => self.can_write,
      Capability::Delete => self.can_delete,
      Capability::Admin => false,
    }
  }

  /// At least one bit is set.
  pub fn any(&self) -> bool {
    self.can_read || self.can_write || self.can_delete || self.is_admin
  }
}

/// A stored grant. At most one row exists per `(user_id, folder_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
  pub permission_id: Uuid,
  pub user_id:       Uuid,
  pub folder_id:     Uuid,
  #[serde(flatten)]
  pub flags:         PermissionFlags,
  pub granted_by:    Option<Uuid>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

/// Input to [`crate::store::DocumentStore::upsert_permission`].
#[derive(Debug, Clone)]
pub struct NewPermission {
  pub user_id:    Uuid,
  pub folder_id:  Uuid,
  pub flags:      PermissionFlags,
  pub granted_by: Uuid,
}
