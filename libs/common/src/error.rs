//! Custom error types for the common library
//!
//! `DatabaseError` covers pool setup, `StoreError` covers calls into the
//! storage collaborators, and `AccountError` is the tagged error every
//! service operation returns to its transport.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred during database migration
    #[error("Database migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Failure reported by a storage collaborator (users, sessions, relations)
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint (username, email) rejected the write
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SqlxError> for StoreError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(db.constraint().unwrap_or("unique").to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;

/// Stable error class exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    NotFound,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// Numeric class code (mirrors the HTTP status it maps to)
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Error returned by account and session operations
///
/// The message is safe to show to the caller. `Internal` never carries
/// the underlying cause; log it at the point of detection instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl AccountError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AccountError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AccountError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AccountError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AccountError::Conflict(message.into())
    }

    /// Internal failure with the generic user-facing message
    pub fn internal() -> Self {
        AccountError::Internal("Something went wrong".to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountError::BadRequest(_) => ErrorKind::BadRequest,
            AccountError::Unauthorized(_) => ErrorKind::Unauthorized,
            AccountError::NotFound(_) => ErrorKind::NotFound,
            AccountError::Conflict(_) => ErrorKind::Conflict,
            AccountError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    pub fn message(&self) -> &str {
        match self {
            AccountError::BadRequest(msg)
            | AccountError::Unauthorized(msg)
            | AccountError::NotFound(msg)
            | AccountError::Conflict(msg)
            | AccountError::Internal(msg) => msg,
        }
    }
}

/// Type alias for Result with AccountError
pub type AccountResult<T> = Result<T, AccountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(AccountError::bad_request("x").status_code(), 400);
        assert_eq!(AccountError::unauthorized("x").status_code(), 401);
        assert_eq!(AccountError::not_found("x").status_code(), 404);
        assert_eq!(AccountError::conflict("x").status_code(), 409);
        assert_eq!(AccountError::internal().status_code(), 500);
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = AccountError::internal();
        assert_eq!(err.kind().as_str(), "INTERNAL_ERROR");
        assert_eq!(err.message(), "Something went wrong");
    }

    #[test]
    fn test_io_error_converts_to_store_error() {
        let err: StoreError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
