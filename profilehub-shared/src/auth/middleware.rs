/// Bearer-token authentication
///
/// [`authenticate_bearer`] turns an `Authorization` header into an
/// [`AuthContext`]. The API wraps it in an axum middleware that inserts the
/// context into request extensions, where handlers pick it up with
/// `Extension<AuthContext>`.
///
/// # Example
///
/// ```
/// use axum::Extension;
/// use profilehub_shared::auth::middleware::AuthContext;
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello, user {}!", auth.user_id)
/// }
/// ```

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};

/// Identity of the caller, attached to authenticated requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing authorization header")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::MissingCredentials | AuthError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            AuthError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Validates the `Authorization: Bearer <token>` header.
///
/// # Errors
///
/// - `MissingCredentials` when the header is absent or not valid ASCII
/// - `InvalidFormat` when the scheme is not `Bearer`
/// - `InvalidToken` when the token is expired, forged, or not an access token
pub fn authenticate_bearer(headers: &HeaderMap, secret: &str) -> Result<AuthContext, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))?;

    let claims = validate_access_token(token.trim(), secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        JwtError::InvalidIssuer { .. } => AuthError::InvalidToken("Invalid issuer".to_string()),
        other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
    })?;

    Ok(AuthContext {
        user_id: claims.sub,
    })
}
