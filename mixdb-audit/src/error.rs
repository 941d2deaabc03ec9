//! Error types for mixdb-audit

use thiserror::Error;

pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Errors raised while running a pass or writing its reports
#[derive(Debug, Error)]
pub enum AuditError {
    /// Storage, configuration or validation error from mixdb-common
    #[error(transparent)]
    Common(#[from] mixdb_common::Error),

    /// CSV input or report file error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON summary export error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for AuditError {
    fn from(err: sqlx::Error) -> Self {
        AuditError::Common(mixdb_common::Error::Database(err))
    }
}
