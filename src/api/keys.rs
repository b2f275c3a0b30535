//! Remote resources and their cache bookkeeping keys.

use sha2::{Digest, Sha256};

use crate::cache::QueryKey;

/// A backend resource the client reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceKey {
  /// The signed-in user
  CurrentUser,
  /// All roles with their grants
  RolePermissions,
  /// One role by id
  RolePermission { id: i64 },
  /// The permission catalog
  Permissions,
}

impl ResourceKey {
  /// Path relative to the API base URL.
  pub fn path(&self) -> String {
    match self {
      Self::CurrentUser => "auth/me".to_string(),
      Self::RolePermissions => "role-permissions".to_string(),
      Self::RolePermission { id } => format!("role-permissions/{}", id),
      Self::Permissions => "permissions".to_string(),
    }
  }
}

impl QueryKey for ResourceKey {
  fn cache_hash(&self) -> String {
    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(self.path().as_bytes());
    hex::encode(hasher.finalize())
  }

  fn description(&self) -> String {
    match self {
      Self::CurrentUser => "current user".to_string(),
      Self::RolePermissions => "all role permissions".to_string(),
      Self::RolePermission { id } => format!("role permission {}", id),
      Self::Permissions => "permission catalog".to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_hash_is_stable_and_distinct() {
    let a = ResourceKey::RolePermission { id: 1 }.cache_hash();
    let b = ResourceKey::RolePermission { id: 1 }.cache_hash();
    let c = ResourceKey::RolePermission { id: 2 }.cache_hash();

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
  }

  #[test]
  fn test_paths() {
    assert_eq!(ResourceKey::CurrentUser.path(), "auth/me");
    assert_eq!(
      ResourceKey::RolePermission { id: 5 }.path(),
      "role-permissions/5"
    );
  }
}
