//! Serde helpers for the shapes the backend actually sends.
//!
//! The backend is loose about envelopes and scalar types: payloads may or may
//! not be wrapped in `{ "data": ... }`, ids arrive as numbers or strings, and
//! permission sets are sometimes a JSON array and sometimes a string.

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeSet;

/// Response body, either bare or wrapped in a `data` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
  Wrapped {
    data: T,
    #[allow(dead_code)]
    #[serde(default)]
    message: Option<String>,
  },
  Bare(T),
}

impl<T> Envelope<T> {
  pub fn into_inner(self) -> T {
    match self {
      Envelope::Wrapped { data, .. } => data,
      Envelope::Bare(data) => data,
    }
  }
}

/// Top-level fields that mark an object as a user rather than an envelope.
const USER_FIELDS: [&str; 3] = ["id", "_id", "email"];

/// Take the user object out of an `auth/me` style body.
///
/// A user carries its own `data` member, so `{ "data": ... }` only counts as
/// an envelope when the outer object has no user fields.
pub fn user_payload(body: Value) -> Value {
  match body {
    Value::Object(mut map) if !USER_FIELDS.iter().any(|f| map.contains_key(*f)) => {
      match map.remove("data") {
        Some(inner @ Value::Object(_)) => inner,
        Some(other) => {
          map.insert("data".to_string(), other);
          Value::Object(map)
        }
        None => Value::Object(map),
      }
    }
    other => other,
  }
}

/// Error body the backend sends with non-success statuses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default, alias = "error")]
  pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdLike {
  Number(i64),
  Text(String),
}

impl IdLike {
  fn into_i64<E: de::Error>(self) -> Result<i64, E> {
    match self {
      IdLike::Number(n) => Ok(n),
      IdLike::Text(s) => s
        .trim()
        .parse()
        .map_err(|_| E::custom(format!("invalid id '{}'", s))),
    }
  }

  fn into_string(self) -> String {
    match self {
      IdLike::Number(n) => n.to_string(),
      IdLike::Text(s) => s,
    }
  }
}

/// Deserialize an optional numeric id that may be sent as a string.
pub fn optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<IdLike>::deserialize(deserializer)? {
    Some(IdLike::Text(s)) if s.trim().is_empty() => Ok(None),
    Some(id) => id.into_i64().map(Some),
    None => Ok(None),
  }
}

/// Deserialize an optional string id that may be sent as a number.
pub fn optional_string_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(
    Option::<IdLike>::deserialize(deserializer)?
      .map(IdLike::into_string)
      .filter(|s| !s.is_empty()),
  )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIdSet {
  List(Vec<IdLike>),
  Text(String),
}

/// Deserialize a set of ids from an array, a JSON-encoded array string, or a
/// comma separated string.
pub fn id_set<'de, D>(deserializer: D) -> Result<BTreeSet<i64>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Option::<RawIdSet>::deserialize(deserializer)?;
  match raw {
    None => Ok(BTreeSet::new()),
    Some(RawIdSet::List(ids)) => ids.into_iter().map(IdLike::into_i64).collect(),
    Some(RawIdSet::Text(text)) => parse_id_text(&text).map_err(de::Error::custom),
  }
}

fn parse_id_text(text: &str) -> Result<BTreeSet<i64>, String> {
  let text = text.trim();
  if text.starts_with('[') {
    let ids: Vec<IdLike> =
      serde_json::from_str(text).map_err(|e| format!("invalid id list '{}': {}", text, e))?;
    return ids
      .into_iter()
      .map(|id| id.into_i64::<serde_json::Error>().map_err(|e| e.to_string()))
      .collect();
  }

  text
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| s.parse().map_err(|_| format!("invalid id '{}'", s)))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug, Deserialize)]
  struct Holder {
    #[serde(default, deserialize_with = "id_set")]
    ids: BTreeSet<i64>,
    #[serde(default, deserialize_with = "optional_i64")]
    id: Option<i64>,
  }

  fn ids(json: &str) -> Vec<i64> {
    let holder: Holder = serde_json::from_str(json).unwrap();
    holder.ids.into_iter().collect()
  }

  #[test]
  fn test_id_set_formats_agree() {
    assert_eq!(ids(r#"{"ids": [3, 1, 2]}"#), vec![1, 2, 3]);
    assert_eq!(ids(r#"{"ids": "[3,1,2]"}"#), vec![1, 2, 3]);
    assert_eq!(ids(r#"{"ids": "3, 1,2"}"#), vec![1, 2, 3]);
    assert_eq!(ids(r#"{"ids": ["3", 1, "2"]}"#), vec![1, 2, 3]);
  }

  #[test]
  fn test_id_set_empty_forms() {
    assert!(ids(r#"{}"#).is_empty());
    assert!(ids(r#"{"ids": null}"#).is_empty());
    assert!(ids(r#"{"ids": ""}"#).is_empty());
    assert!(ids(r#"{"ids": "[]"}"#).is_empty());
  }

  #[test]
  fn test_id_set_rejects_garbage() {
    assert!(serde_json::from_str::<Holder>(r#"{"ids": "1,two"}"#).is_err());
  }

  #[test]
  fn test_optional_id_accepts_strings() {
    let holder: Holder = serde_json::from_str(r#"{"id": "42"}"#).unwrap();
    assert_eq!(holder.id, Some(42));
    let holder: Holder = serde_json::from_str(r#"{"id": ""}"#).unwrap();
    assert_eq!(holder.id, None);
    let holder: Holder = serde_json::from_str(r#"{"id": 7}"#).unwrap();
    assert_eq!(holder.id, Some(7));
  }

  #[test]
  fn test_envelope_wrapped_and_bare() {
    let wrapped: Envelope<Vec<i64>> =
      serde_json::from_str(r#"{"data": [1, 2], "message": "ok"}"#).unwrap();
    assert_eq!(wrapped.into_inner(), vec![1, 2]);

    let bare: Envelope<Vec<i64>> = serde_json::from_str("[1, 2]").unwrap();
    assert_eq!(bare.into_inner(), vec![1, 2]);
  }

  #[test]
  fn test_user_payload_keeps_bare_user_with_data() {
    let user = serde_json::json!({
      "id": "u-1",
      "email": "ada@example.edu",
      "fullName": "Ada",
      "data": { "dept": "Math" }
    });
    assert_eq!(user_payload(user.clone()), user);
  }

  #[test]
  fn test_user_payload_unwraps_envelope() {
    let user = serde_json::json!({ "_id": 3, "email": "ops@example.edu" });
    let body = serde_json::json!({ "data": user.clone(), "message": "ok" });
    assert_eq!(user_payload(body), user);

    // A non-object `data` is not an envelope
    let odd = serde_json::json!({ "data": "x" });
    assert_eq!(user_payload(odd.clone()), odd);
  }
}
