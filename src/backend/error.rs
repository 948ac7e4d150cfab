use thiserror::Error;

/// Errors surfaced by the backend and the data layer on top of it.
///
/// Messages coming from the provider are carried verbatim so they can be
/// shown as-is in form and list alerts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
  /// A required form field was missing or malformed. Never reaches the network.
  #[error("{0}")]
  Validation(String),
  /// A single-row lookup or a write by id matched no rows.
  #[error("No matching row in {table}")]
  NotFound { table: String },
  /// The relational API rejected the request (constraint violation, bad filter, ...).
  #[error("{message}")]
  Provider {
    code: Option<String>,
    message: String,
  },
  /// Object storage rejected an upload, update or download.
  #[error("{message}")]
  Storage { status: Option<u16>, message: String },
  /// The auth service rejected the credentials or session.
  #[error("{0}")]
  Auth(String),
  #[error("No authenticated user found")]
  NotAuthenticated,
  /// The request never produced a provider response.
  #[error("Request failed: {0}")]
  Transport(String),
  #[error("Failed to decode response: {0}")]
  Decode(String),
  /// The query cache could not be accessed.
  #[error("Cache error: {0}")]
  Cache(String),
  /// Reading an upload or writing a download on the local disk failed.
  #[error("{0}")]
  File(String),
}

impl DbError {
  pub fn provider(message: impl Into<String>) -> Self {
    DbError::Provider {
      code: None,
      message: message.into(),
    }
  }

  pub fn not_found(table: &str) -> Self {
    DbError::NotFound {
      table: table.to_string(),
    }
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, DbError::NotFound { .. })
  }
}

impl From<reqwest::Error> for DbError {
  fn from(e: reqwest::Error) -> Self {
    DbError::Transport(e.to_string())
  }
}

impl From<serde_json::Error> for DbError {
  fn from(e: serde_json::Error) -> Self {
    DbError::Decode(e.to_string())
  }
}

pub type DbResult<T> = std::result::Result<T, DbError>;
