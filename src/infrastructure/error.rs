use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("time-table provider request failed: {0}")]
    Http(String),
    #[error("malformed timing table: {0}")]
    MalformedTable(String),
    #[error("time-table provider unavailable and no cached month for {cache_key}: {reason}")]
    ProviderUnavailable { cache_key: String, reason: String },
    #[error("notification permission is not granted")]
    PermissionDenied,
    #[error("notification delivery failed: {0}")]
    Notification(String),
}

impl InfraError {
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::ProviderUnavailable { .. })
    }

    pub(crate) fn lock_poisoned(what: &str, error: impl std::fmt::Display) -> Self {
        Self::InvalidConfig(format!("{what} lock poisoned: {error}"))
    }
}
