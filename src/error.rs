//! Error types shared by the client, the query builders and the repository.

/// Errors surfaced by every fallible operation of the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The record is absent both locally and in the CMS.
  #[error("{entity} with {key} not found. Ensure it exists in local storage or in the CMS.")]
  NotFound { entity: String, key: String },

  /// Bad entity type binding, malformed identifier or unusable record.
  #[error("Invalid argument: {0}")]
  InvalidArgument(String),

  /// Directus reported an error, or answered with a non-success status.
  #[error("Directus API error: {0}")]
  RemoteApi(String),

  /// Network or connection failure, passed through from the transport.
  #[error("Transport error: {0}")]
  Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("Storage error: {0}")]
  Storage(#[from] rusqlite::Error),

  #[error("Serialization error: {0}")]
  Serde(#[from] serde_json::Error),

  /// A stored row could not be read back.
  #[error("Corrupt local record: {0}")]
  Corrupt(String),

  #[error("Lock poisoned: {0}")]
  Lock(String),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Config error: {0}")]
  Config(String),
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    Self::Transport(Box::new(err))
  }
}

impl Error {
  pub(crate) fn not_found(entity: &str, key: impl Into<String>) -> Self {
    Self::NotFound {
      entity: entity.to_string(),
      key: key.into(),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
