use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

/// Errors raised by persistence backends.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("document serialization failed: {0}")]
    Serialization(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl BackendError {
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Unavailable(_) => "WFE-STORE-001",
            BackendError::Query(_) => "WFE-STORE-002",
            BackendError::Serialization(_) => "WFE-STORE-003",
            BackendError::Conflict(_) => "WFE-STORE-004",
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                BackendError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                BackendError::Conflict(db.message().to_string())
            }
            other => BackendError::Query(other.to_string()),
        }
    }
}
