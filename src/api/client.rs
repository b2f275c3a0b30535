use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::error::FetchError;
use super::keys::ResourceKey;
use super::types::{LoginReply, LoginRequest, Permission, RolePermission, SessionRecord};
use super::wire::{user_payload, ApiErrorBody, Envelope};
use crate::cache::{Cacheable, IdGenerator};
use crate::config::ApiConfig;

/// Give every record that arrived without a key a locally synthesized one.
///
/// Returns how many records needed a key.
pub fn assign_missing_ids<T: Cacheable>(records: &mut [T], ids: &IdGenerator) -> usize {
  let mut assigned = 0;
  for record in records.iter_mut().filter(|r| r.cache_key().is_none()) {
    record.assign_key(ids.next_id());
    assigned += 1;
  }
  assigned
}

/// Map a response status and body to the body bytes or a typed failure.
fn classify(status: StatusCode, body: &[u8]) -> Result<Vec<u8>, FetchError> {
  if status == StatusCode::UNAUTHORIZED {
    return Err(FetchError::Unauthorized);
  }

  if !status.is_success() {
    let message = serde_json::from_slice::<ApiErrorBody>(body)
      .ok()
      .and_then(|b| b.message)
      .unwrap_or_else(|| {
        status
          .canonical_reason()
          .unwrap_or("request failed")
          .to_string()
      });
    return Err(FetchError::Status {
      status: status.as_u16(),
      message,
    });
  }

  Ok(body.to_vec())
}

fn session_from(payload: Value) -> Result<SessionRecord, FetchError> {
  SessionRecord::from_payload(payload).map_err(|e| FetchError::Decode(e.to_string()))
}

/// REST client for the administration backend
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
  probe_path: String,
  token: Arc<RwLock<Option<String>>>,
  ids: Arc<IdGenerator>,
}

impl ApiClient {
  pub fn new(
    config: &ApiConfig,
    token: Option<String>,
    ids: Arc<IdGenerator>,
  ) -> color_eyre::Result<Self> {
    let mut base_url = config.base_url.clone();
    // Url::join drops the last segment unless the base ends with a slash
    if !base_url.ends_with('/') {
      base_url.push('/');
    }
    let base = Url::parse(&base_url)
      .map_err(|e| color_eyre::eyre::eyre!("Invalid API base URL {}: {}", config.base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| color_eyre::eyre::eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      probe_path: config.probe_path.clone(),
      token: Arc::new(RwLock::new(token)),
      ids,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base
  }

  /// Whether a bearer token is installed.
  pub fn has_token(&self) -> bool {
    self.token.read().map(|t| t.is_some()).unwrap_or(false)
  }

  /// Install or remove the bearer token used for every request.
  pub fn set_token(&self, token: Option<String>) {
    match self.token.write() {
      Ok(mut slot) => *slot = token,
      Err(e) => warn!(error = %e, "token lock poisoned"),
    }
  }

  fn url(&self, path: &str) -> Result<Url, FetchError> {
    self
      .base
      .join(path)
      .map_err(|e| FetchError::Transport(format!("invalid path {}: {}", path, e)))
  }

  fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, FetchError> {
    let url = self.url(path)?;
    let mut builder = self.http.request(method, url);
    if let Ok(token) = self.token.read() {
      if let Some(token) = token.as_deref() {
        builder = builder.bearer_auth(token);
      }
    }
    Ok(builder)
  }

  /// Send a request and return the raw body bytes of a successful response.
  async fn send_raw(&self, builder: RequestBuilder) -> Result<Vec<u8>, FetchError> {
    let response = builder.send().await?;
    let status = response.status();
    let body = response.bytes().await?;
    classify(status, &body)
  }

  /// Send a request and decode its (possibly enveloped) JSON body.
  async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, FetchError> {
    let body = self.send_raw(builder).await?;
    serde_json::from_slice::<Envelope<T>>(&body)
      .map(Envelope::into_inner)
      .map_err(|e| FetchError::Decode(e.to_string()))
  }

  async fn get<T: DeserializeOwned>(&self, key: &ResourceKey) -> Result<T, FetchError> {
    debug!(resource = %key.path(), "GET");
    self.send(self.request(Method::GET, &key.path())?).await
  }

  async fn send_json<T: DeserializeOwned, B: Serialize>(
    &self,
    method: Method,
    key: &ResourceKey,
    body: &B,
  ) -> Result<T, FetchError> {
    debug!(resource = %key.path(), %method, "sending");
    self
      .send(self.request(method, &key.path())?.json(body))
      .await
  }

  /// Fetch a list, synthesizing ids for items that came without one.
  async fn get_list<T: Cacheable>(&self, key: &ResourceKey) -> Result<Vec<T>, FetchError> {
    let mut records: Vec<T> = self.get(key).await?;
    let assigned = assign_missing_ids(&mut records, &self.ids);
    if assigned > 0 {
      debug!(resource = %key.path(), assigned, "synthesized ids for keyless items");
    }
    Ok(records)
  }

  /// Fetch the signed-in user.
  pub async fn current_user(&self) -> Result<SessionRecord, FetchError> {
    let key = ResourceKey::CurrentUser;
    debug!(resource = %key.path(), "GET");
    let body = self.send_raw(self.request(Method::GET, &key.path())?).await?;
    let payload: Value =
      serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
    session_from(user_payload(payload))
  }

  /// Exchange credentials for a token and the signed-in user.
  ///
  /// On success the token is installed for subsequent requests.
  pub async fn login(&self, email: &str, password: &str) -> Result<SessionRecord, FetchError> {
    let request = self
      .request(Method::POST, "auth/login")?
      .json(&LoginRequest { email, password });
    let reply: LoginReply = self.send(request).await?;

    self.set_token(Some(reply.token));

    match reply.user {
      Some(payload) => session_from(user_payload(payload)),
      None => self.current_user().await,
    }
  }

  pub async fn role_permissions(&self) -> Result<Vec<RolePermission>, FetchError> {
    self.get_list(&ResourceKey::RolePermissions).await
  }

  pub async fn role_permission(&self, id: i64) -> Result<RolePermission, FetchError> {
    let mut role: RolePermission = self.get(&ResourceKey::RolePermission { id }).await?;
    role.id.get_or_insert(id);
    Ok(role)
  }

  pub async fn create_role_permission(
    &self,
    role: &RolePermission,
  ) -> Result<RolePermission, FetchError> {
    let mut created: RolePermission = self
      .send_json(Method::POST, &ResourceKey::RolePermissions, role)
      .await?;
    if created.id.is_none() {
      created.assign_key(self.ids.next_id());
    }
    Ok(created)
  }

  pub async fn update_role_permission(
    &self,
    id: i64,
    role: &RolePermission,
  ) -> Result<RolePermission, FetchError> {
    let mut updated: RolePermission = self
      .send_json(Method::PUT, &ResourceKey::RolePermission { id }, role)
      .await?;
    updated.id.get_or_insert(id);
    Ok(updated)
  }

  pub async fn delete_role_permission(&self, id: i64) -> Result<(), FetchError> {
    let key = ResourceKey::RolePermission { id };
    debug!(resource = %key.path(), "DELETE");
    self
      .send_raw(self.request(Method::DELETE, &key.path())?)
      .await
      .map(|_| ())
  }

  pub async fn permissions(&self) -> Result<Vec<Permission>, FetchError> {
    self.get_list(&ResourceKey::Permissions).await
  }

  /// Check whether the backend answers at all. Any HTTP status counts.
  pub async fn probe(&self) -> bool {
    let Ok(url) = self.url(&self.probe_path) else {
      return false;
    };
    match self.http.head(url).send().await {
      Ok(_) => true,
      Err(e) => {
        debug!(error = %e, "reachability probe failed");
        false
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config(base_url: &str) -> ApiConfig {
    ApiConfig {
      base_url: base_url.to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn test_assign_missing_ids_only_touches_keyless() {
    let ids = IdGenerator::new();
    let mut roles = vec![
      RolePermission {
        id: Some(1),
        ..Default::default()
      },
      RolePermission::default(),
      RolePermission::default(),
    ];

    assert_eq!(assign_missing_ids(&mut roles, &ids), 2);
    assert_eq!(roles[0].id, Some(1));
    assert!(roles[1].id.is_some());
    assert_ne!(roles[1].id, roles[2].id);
  }

  #[test]
  fn test_base_url_without_trailing_slash_keeps_prefix() {
    let client = ApiClient::new(
      &config("https://api.example.edu/api/v1"),
      None,
      Arc::new(IdGenerator::new()),
    )
    .unwrap();

    let url = client.url("role-permissions/3").unwrap();
    assert_eq!(url.as_str(), "https://api.example.edu/api/v1/role-permissions/3");
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    assert!(ApiClient::new(&config("not a url"), None, Arc::new(IdGenerator::new())).is_err());
  }

  #[test]
  fn test_classify_success_returns_body() {
    assert_eq!(classify(StatusCode::OK, b"[1]").unwrap(), b"[1]".to_vec());
  }

  #[test]
  fn test_classify_unauthorized() {
    let err = classify(StatusCode::UNAUTHORIZED, br#"{"message":"expired"}"#).unwrap_err();
    assert_eq!(err, FetchError::Unauthorized);
    assert!(!err.is_retryable());
  }

  #[test]
  fn test_classify_uses_backend_message() {
    let err = classify(StatusCode::NOT_FOUND, br#"{"message":"role not found"}"#).unwrap_err();
    assert_eq!(
      err,
      FetchError::Status {
        status: 404,
        message: "role not found".into()
      }
    );
    assert!(!err.is_retryable());
  }

  #[test]
  fn test_classify_server_error_is_retryable() {
    let err = classify(StatusCode::SERVICE_UNAVAILABLE, b"<html>down</html>").unwrap_err();
    assert_eq!(
      err,
      FetchError::Status {
        status: 503,
        message: "Service Unavailable".into()
      }
    );
    assert!(err.is_retryable());
  }

  #[test]
  fn test_session_from_bare_user_with_data() {
    let body = serde_json::json!({
      "id": "u-1",
      "email": "ada@example.edu",
      "fullName": "Ada",
      "data": { "dept": "Math" }
    });
    let session = session_from(user_payload(body)).unwrap();
    assert_eq!(session.id.as_deref(), Some("u-1"));
    assert_eq!(session.email, "ada@example.edu");
  }

  #[test]
  fn test_token_roundtrip() {
    let client = ApiClient::new(
      &config("http://localhost:8080/api"),
      None,
      Arc::new(IdGenerator::new()),
    )
    .unwrap();

    assert!(!client.has_token());
    client.set_token(Some("abc".into()));
    assert!(client.has_token());
    client.set_token(None);
    assert!(!client.has_token());
  }
}
