//! Common error types for mixdb

use thiserror::Error;

/// Common result type for mixdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the mix database layer and the passes built on it
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite query, pool or transaction failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database file, root folder or config file access
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed config.toml or out-of-range `[reconcile]` values
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mix, dataset or component row missing when it is updated
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored decimal text or an import cell that does not parse
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unexpected state, including failures injected by test stores
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_failing_value() {
        let err = Error::InvalidInput("dosage_kg_m3 'abc' is not a decimal".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid input: dosage_kg_m3 'abc' is not a decimal"
        );

        let err = Error::NotFound("mix M7".to_string());
        assert_eq!(err.to_string(), "Not found: mix M7");
    }

    #[test]
    fn test_io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "mixdb.db");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
