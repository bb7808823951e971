//! Error taxonomy and HTTP translation.
//!
//! Driver errors are classified here exactly once; downstream code never
//! re-interprets them. Every failure path produces the standard
//! `{success: false, message, errors?}` envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::{ApiResponse, FieldError};
use sqlx::error::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::error;

static DEBUG_ERRORS: AtomicBool = AtomicBool::new(false);

/// When enabled, 500 responses disclose the internal error message.
/// Set once at startup from `Config::debug`.
pub fn set_debug(enabled: bool) {
    DEBUG_ERRORS.store(enabled, Ordering::Relaxed);
}

fn debug_enabled() -> bool {
    DEBUG_ERRORS.load(Ordering::Relaxed)
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// Schema validation failed; carries every field-level message
    #[error("Errores de validación")]
    Validation(Vec<FieldError>),
    /// The store rejected the data (CHECK / NOT NULL constraint)
    #[error("{0}")]
    Constraint(String),
    #[error("{0}")]
    NotFound(String),
    /// Unique constraint violation
    #[error("Conflicto: el registro ya existe")]
    Conflict(String),
    /// Foreign key violation
    #[error("Error de integridad referencial")]
    ReferentialIntegrity(String),
    /// The store itself is unreachable; retryable by the caller
    #[error("Error de conexión a la base de datos")]
    Unavailable(String),
    #[error("Error interno del servidor")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.kind() {
                ErrorKind::UniqueViolation => {
                    return ApiError::Conflict(db.message().to_string());
                }
                ErrorKind::ForeignKeyViolation => {
                    return ApiError::ReferentialIntegrity(db.message().to_string());
                }
                ErrorKind::CheckViolation | ErrorKind::NotNullViolation => {
                    return ApiError::Constraint(format!(
                        "Errores de validación: {}",
                        db.message()
                    ));
                }
                _ => {}
            },
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_) => {
                return ApiError::Unavailable(err.to_string());
            }
            _ => {}
        }
        ApiError::Internal(err.into())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Constraint(_) | ApiError::ReferentialIntegrity(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body: ApiResponse<()> = match self {
            ApiError::Validation(errors) => {
                ApiResponse::error_with_fields("Errores de validación", errors)
            }
            ApiError::Constraint(message) => ApiResponse::error(message),
            ApiError::NotFound(message) => ApiResponse::error(message),
            ApiError::Conflict(detail) => {
                ApiResponse::error("Conflicto: el registro ya existe").with_detail(detail)
            }
            ApiError::ReferentialIntegrity(detail) => {
                error!("Violación de integridad referencial: {detail}");
                ApiResponse::error("Error de integridad referencial")
                    .with_detail("La operación viola una restricción de clave foránea")
            }
            ApiError::Unavailable(detail) => {
                error!("Base de datos no disponible: {detail}");
                ApiResponse::error("Error de conexión a la base de datos")
                    .with_detail("Servicio temporalmente no disponible")
            }
            ApiError::Internal(source) => {
                error!("Error interno: {source:?}");
                let body = ApiResponse::error("Error interno del servidor");
                if debug_enabled() {
                    body.with_detail(source.to_string())
                } else {
                    body
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_taxonomy() {
        let cases = [
            (
                ApiError::Validation(vec![FieldError::new("x", "y")]),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Constraint("Errores de validación: chk".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::NotFound("Gestión con ID 9 no encontrada".into()),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                ApiError::ReferentialIntegrity("fk".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Unavailable("pool".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(err.status(), expected);
        }
    }

    #[test]
    fn pool_errors_classify_as_unavailable() {
        let err: ApiError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, ApiError::Unavailable(_)));

        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::Internal(_)));
    }
}
