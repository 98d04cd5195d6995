/// Error handling for the API server
///
/// Handlers return `ApiResult<T>`; every error turns into a JSON body
///
/// ```json
/// { "error": "not_found", "message": "User not found" }
/// ```
///
/// with an optional `details` array for validation failures.
///
/// # Example
///
/// ```
/// use profilehub_api::error::{ApiError, ApiResult};
/// use axum::Json;
///
/// async fn handler(found: bool) -> ApiResult<Json<&'static str>> {
///     if !found {
///         return Err(ApiError::NotFound("User not found".to_string()));
///     }
///     Ok(Json("ok"))
/// }
/// ```

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use profilehub_shared::auth::{jwt::JwtError, middleware::AuthError, password::PasswordError};
use profilehub_shared::storage::BlobError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),

    /// 401
    Unauthorized(String),

    /// 403
    Forbidden(String),

    /// 404
    NotFound(String),

    /// 409, e.g. email already registered
    Conflict(String),

    /// 413
    PayloadTooLarge(String),

    /// 422 with per-field details
    ValidationError(Vec<ValidationErrorDetail>),

    /// 500 when persisting a profile update fails. The detail is logged,
    /// never returned.
    UpdateFailed(String),

    /// 500; the detail is logged, never returned
    InternalError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    pub field: String,
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Body of every error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable code such as `bad_request`
    pub error: String,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::UpdateFailed(msg) => write!(f, "Update failed: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", msg, None)
            }
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::UpdateFailed(msg) => {
                tracing::error!(error = %msg, "Profile update could not be persisted");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "update_failed",
                    "Update failed".to_string(),
                    None,
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("email") {
                        return ApiError::Conflict("Email already registered".to_string());
                    }
                    return ApiError::Conflict(format!("Constraint violation: {}", constraint));
                }
                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => {
                ApiError::Unauthorized("Missing authorization header".to_string())
            }
            AuthError::InvalidFormat(msg) => ApiError::Unauthorized(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => {
                ApiError::InternalError(format!("Token creation failed: {}", msg))
            }
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            other => ApiError::Unauthorized(format!("Invalid token: {}", other)),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(_) => ApiError::NotFound("Object not found".to_string()),
            BlobError::InvalidKey(e) => ApiError::BadRequest(e.to_string()),
            other => ApiError::InternalError(format!("Blob store error: {}", other)),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("Upload exceeds the size limit".to_string())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

/// Flattens `validator` errors into response details.
pub fn validation_details(errors: &validator::ValidationErrors) -> Vec<ValidationErrorDetail> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |error| ValidationErrorDetail {
                field: field.to_string(),
                message: error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "Validation failed".to_string()),
            })
        })
        .collect()
}
