//! Records exchanged with the backend and kept in the local store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use super::wire::{id_set, optional_i64, optional_string_id};
use crate::cache::{Cacheable, Table};

/// The signed-in user. At most one is meaningful at a time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
  #[serde(default, deserialize_with = "optional_string_id")]
  pub id: Option<String>,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub full_name: String,
  #[serde(default)]
  pub auth_type: String,
  /// Raw user payload as the backend sent it
  #[serde(default)]
  pub data: Value,
}

/// User object as sent by `auth/me` and `auth/login`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiUser {
  #[serde(default, deserialize_with = "optional_string_id")]
  id: Option<String>,
  #[serde(default, rename = "_id", deserialize_with = "optional_string_id")]
  object_id: Option<String>,
  #[serde(default)]
  email: String,
  #[serde(default)]
  full_name: String,
  #[serde(default)]
  name: String,
  #[serde(default)]
  auth_type: String,
  #[serde(default)]
  provider: String,
}

impl SessionRecord {
  /// Build a session from a raw user payload, keeping the payload itself.
  pub fn from_payload(payload: Value) -> serde_json::Result<Self> {
    let user: ApiUser = serde_json::from_value(payload.clone())?;
    let non_empty = |preferred: String, fallback: String| {
      if preferred.is_empty() {
        fallback
      } else {
        preferred
      }
    };
    Ok(Self {
      id: user.id.or(user.object_id),
      email: user.email,
      full_name: non_empty(user.full_name, user.name),
      auth_type: non_empty(user.auth_type, user.provider),
      data: payload,
    })
  }

  /// Name to show for this user.
  pub fn display_name(&self) -> &str {
    if self.full_name.is_empty() {
      &self.email
    } else {
      &self.full_name
    }
  }
}

/// A role together with the permissions granted to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePermission {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    deserialize_with = "optional_i64"
  )]
  pub id: Option<i64>,
  #[serde(default)]
  pub role_name: String,
  #[serde(default)]
  pub role_key: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub role_description: Option<String>,
  #[serde(default)]
  pub is_default: bool,
  #[serde(default, deserialize_with = "id_set")]
  pub permissions: BTreeSet<i64>,
}

/// An entry of the permission catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    deserialize_with = "optional_i64"
  )]
  pub id: Option<i64>,
  #[serde(default)]
  pub name: String,
  /// Resource and action, e.g. `student.create`
  #[serde(default, alias = "permissionKey")]
  pub key: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// Body of `auth/login`.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
  pub email: &'a str,
  pub password: &'a str,
}

/// Reply of `auth/login`.
#[derive(Debug, Deserialize)]
pub(crate) struct LoginReply {
  #[serde(alias = "accessToken", alias = "access_token")]
  pub token: String,
  #[serde(default)]
  pub user: Option<Value>,
}

impl Cacheable for SessionRecord {
  fn cache_key(&self) -> Option<String> {
    self.id.clone()
  }

  fn assign_key(&mut self, id: i64) {
    self.id = Some(id.to_string());
  }

  fn table() -> Table {
    Table::Session
  }
}

impl Cacheable for RolePermission {
  fn cache_key(&self) -> Option<String> {
    self.id.map(|id| id.to_string())
  }

  fn assign_key(&mut self, id: i64) {
    self.id = Some(id);
  }

  fn table() -> Table {
    Table::RolePermissions
  }
}

impl Cacheable for Permission {
  fn cache_key(&self) -> Option<String> {
    self.id.map(|id| id.to_string())
  }

  fn assign_key(&mut self, id: i64) {
    self.id = Some(id);
  }

  fn table() -> Table {
    Table::Permissions
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_session_from_payload_keeps_raw_data() {
    let payload = json!({
      "_id": 12,
      "email": "ada@example.edu",
      "name": "Ada Lovelace",
      "authType": "password",
      "department": "Mathematics"
    });
    let session = SessionRecord::from_payload(payload.clone()).unwrap();

    assert_eq!(session.id.as_deref(), Some("12"));
    assert_eq!(session.full_name, "Ada Lovelace");
    assert_eq!(session.auth_type, "password");
    assert_eq!(session.data, payload);
  }

  #[test]
  fn test_session_prefers_id_over_object_id() {
    let session = SessionRecord::from_payload(json!({
      "id": "u-1",
      "_id": "65f0c0ffee",
      "email": "ada@example.edu",
      "fullName": "Ada",
      "name": "ada"
    }))
    .unwrap();

    assert_eq!(session.id.as_deref(), Some("u-1"));
    assert_eq!(session.full_name, "Ada");
  }

  #[test]
  fn test_display_name_falls_back_to_email() {
    let session = SessionRecord {
      email: "ops@example.edu".into(),
      ..Default::default()
    };
    assert_eq!(session.display_name(), "ops@example.edu");
  }

  #[test]
  fn test_role_permission_wire_format() {
    let role: RolePermission = serde_json::from_value(json!({
      "id": "7",
      "roleName": "Teacher",
      "roleKey": "teacher",
      "isDefault": true,
      "permissions": "[4,2]"
    }))
    .unwrap();

    assert_eq!(role.id, Some(7));
    assert!(role.is_default);
    assert_eq!(role.permissions.iter().copied().collect::<Vec<_>>(), vec![2, 4]);

    let out = serde_json::to_value(&role).unwrap();
    assert_eq!(out["permissions"], json!([2, 4]));
    assert!(out.get("roleDescription").is_none());
  }

  #[test]
  fn test_keyless_role_has_no_cache_key() {
    let mut role = RolePermission::default();
    assert_eq!(role.cache_key(), None);
    role.assign_key(99);
    assert_eq!(role.cache_key().as_deref(), Some("99"));
  }
}
