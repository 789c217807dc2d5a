use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};

use crate::response::ApiResponse;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Session store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.into())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl AppError {
    /// Message placed in the response envelope. Authentication failures are
    /// collapsed into one generic message so callers learn nothing about
    /// which check failed.
    fn public_message(&self) -> String {
        match self {
            AppError::AuthError(AuthError::RateLimited) => "Rate limit exceeded".to_string(),
            AppError::AuthError(AuthError::Malformed) => "Malformed authorization header".to_string(),
            AppError::AuthError(AuthError::SigningError(_)) => "Internal server error".to_string(),
            AppError::AuthError(_) => "Unauthorized access".to_string(),
            AppError::StoreError(_) | AppError::ConfigError(_) | AppError::InternalError(_) => {
                "Internal server error".to_string()
            }
            AppError::DatabaseError(DatabaseError::NotFound) => "Record not found".to_string(),
            AppError::DatabaseError(_) => "Internal server error".to_string(),
            AppError::ValidationError(msg) => msg.clone(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let detail = match self {
            AppError::AuthError(AuthError::RateLimited) => "You have exceeded the rate limit",
            AppError::AuthError(AuthError::SigningError(_)) => "Could not issue credentials",
            AppError::AuthError(_) => "You are not allowed to access this resource",
            _ => "",
        };
        HttpResponse::build(status).json(ApiResponse::new(status, self.public_message(), detail))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => match e {
                AuthError::SigningError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                AuthError::Malformed => StatusCode::BAD_REQUEST,
                AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                AuthError::InvalidAlgorithm
                | AuthError::InvalidSignature
                | AuthError::TokenExpired
                | AuthError::MissingClaim(_)
                | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            },
            AppError::StoreError(StoreError::NotFound) => StatusCode::UNAUTHORIZED,
            AppError::StoreError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token signing failed: {0}")]
    SigningError(String),

    #[error("Malformed credential")]
    Malformed,

    #[error("Unexpected signing algorithm")]
    InvalidAlgorithm,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Token expired")]
    TokenExpired,

    #[error("Missing claim: {0}")]
    MissingClaim(&'static str),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limited")]
    RateLimited,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => AuthError::InvalidAlgorithm,
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::Malformed,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Key not found")]
    NotFound,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation timed out")]
    Timeout,
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            _ => DatabaseError::QueryError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::InternalError(_)));

        let config_err = config::ConfigError::NotFound(String::from("key not found"));
        let app_err: AppError = config_err.into();
        assert!(matches!(app_err, AppError::ConfigError(_)));

        let db_err = sqlx::Error::RowNotFound;
        let app_err: AppError = db_err.into();
        assert!(matches!(app_err, AppError::DatabaseError(DatabaseError::NotFound)));
    }

    #[test]
    fn test_jwt_error_mapping() {
        use jsonwebtoken::errors::ErrorKind;

        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature).into();
        assert_eq!(err, AuthError::InvalidSignature);

        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAlgorithm).into();
        assert_eq!(err, AuthError::InvalidAlgorithm);

        let err: AuthError = jsonwebtoken::errors::Error::from(ErrorKind::InvalidToken).into();
        assert_eq!(err, AuthError::Malformed);
    }

    #[test]
    fn test_error_status_codes() {
        let err = AppError::AuthError(AuthError::InvalidSignature);
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = AppError::AuthError(AuthError::MissingClaim("role"));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = AppError::AuthError(AuthError::RateLimited);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err = AppError::AuthError(AuthError::SigningError("no secret".into()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = AppError::StoreError(StoreError::Timeout);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = AppError::DatabaseError(DatabaseError::NotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_display() {
        let err = AppError::ValidationError("test error".to_string());
        assert_eq!(err.to_string(), "Validation error: test error");

        let err = AppError::AuthError(AuthError::MissingClaim("access_uuid"));
        assert_eq!(err.to_string(), "Authentication error: Missing claim: access_uuid");

        let err = AppError::StoreError(StoreError::NotFound);
        assert_eq!(err.to_string(), "Session store error: Key not found");
    }

    #[test]
    fn test_auth_failures_do_not_leak_detail() {
        let err = AppError::AuthError(AuthError::InvalidAlgorithm);
        assert_eq!(err.public_message(), "Unauthorized access");

        let err = AppError::AuthError(AuthError::MissingClaim("uid"));
        assert_eq!(err.public_message(), "Unauthorized access");
    }
}
