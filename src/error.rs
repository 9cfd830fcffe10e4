use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The body sent for every server-side failure.
const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A failure to borrow a connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A failure to build the connection pool.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A row was missing an expected column.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// A view could not be rendered.
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A session could not be encoded.
    #[error("Session error: {0}")]
    Session(String),

    /// Credentials did not match a stored user.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Submitted fields were rejected by the hardened policy.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A username is already taken under the hardened policy.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR.to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR.to_string())
            }

            AppError::CreatePool(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR.to_string())
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing column in row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR.to_string())
            }

            AppError::Template(ref e) => {
                tracing::error!("Template error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR.to_string())
            }

            AppError::Session(ref msg) => {
                tracing::error!("Session error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR.to_string())
            }

            AppError::Authentication(ref msg) => {
                tracing::warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Conflict(ref msg) => {
                tracing::debug!("Conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_SERVER_ERROR.to_string())
            }
        };

        (status, message).into_response()
    }
}
