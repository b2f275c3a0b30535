use thiserror::Error;

/// Failure of a remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  /// Connectivity is down, so the request was never sent.
  #[error("offline, request not sent")]
  Offline,

  /// The backend rejected our credentials.
  #[error("not authenticated")]
  Unauthorized,

  #[error("server returned {status}: {message}")]
  Status { status: u16, message: String },

  #[error("network error: {0}")]
  Transport(String),

  #[error("unexpected response: {0}")]
  Decode(String),
}

impl FetchError {
  /// Whether retrying the same request could succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      FetchError::Transport(_) => true,
      FetchError::Status { status, .. } => *status >= 500,
      FetchError::Offline | FetchError::Unauthorized | FetchError::Decode(_) => false,
    }
  }
}

impl From<reqwest::Error> for FetchError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      FetchError::Decode(e.to_string())
    } else {
      FetchError::Transport(e.to_string())
    }
  }
}
