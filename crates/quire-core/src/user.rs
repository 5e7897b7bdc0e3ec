//! The identity handed to us by the authentication provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stable identity. `is_superuser` bypasses every permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub user_id:      Uuid,
  pub username:     String,
  pub is_superuser: bool,
  pub created_at:   DateTime<Utc>,
}
