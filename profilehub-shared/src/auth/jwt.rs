/// JWT access and refresh tokens
///
/// Tokens are HS256-signed and carry the user ID as `sub` plus a
/// `token_type` claim, so a refresh token can never be used where an access
/// token is expected.
///
/// - **Access token**: 24 hours, sent as `Authorization: Bearer <token>`
/// - **Refresh token**: 30 days, exchanged for a new access token
///
/// # Example
///
/// ```
/// use profilehub_shared::auth::jwt::{create_token, validate_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let claims = Claims::new(user_id, TokenType::Access);
/// let token = create_token(&claims, "your-secret-key")?;
///
/// let validated = validate_token(&token, "your-secret-key")?;
/// assert_eq!(validated.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of the `iss` claim on every token this service issues
pub const ISSUER: &str = "profilehub";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token format: {0}")]
    InvalidFormat(String),

    #[error("Invalid issuer: expected {expected}")]
    InvalidIssuer { expected: String },

    #[error("Wrong token type: expected {expected}")]
    WrongTokenType { expected: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Token claims
///
/// Standard claims `sub`, `iss`, `iat`, `exp`, `nbf` plus `token_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub token_type: TokenType,
}

impl Claims {
    /// Claims expiring after the token type's default lifetime.
    pub fn new(user_id: Uuid, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, token_type, token_type.default_expiration())
    }

    /// Claims expiring after `expires_in`. A negative duration yields an
    /// already-expired token, which is handy in tests.
    pub fn with_expiration(user_id: Uuid, token_type: TokenType, expires_in: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            token_type,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.exp
    }
}

/// Signs claims with HS256.
///
/// # Errors
///
/// Returns `JwtError::CreateError` if encoding fails.
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&Header::new(Algorithm::HS256), claims, &key)
        .map_err(|e| JwtError::CreateError(e.to_string()))
}

/// Verifies signature, expiry, not-before and issuer, then returns the claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    use jsonwebtoken::errors::ErrorKind;

    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidIssuer => JwtError::InvalidIssuer {
                expected: ISSUER.to_string(),
            },
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                JwtError::InvalidFormat(e.to_string())
            }
            _ => JwtError::ValidationError(e.to_string()),
        })
}

/// Like [`validate_token`] but also requires `token_type == Access`.
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != TokenType::Access {
        return Err(JwtError::WrongTokenType { expected: "access" });
    }
    Ok(claims)
}

/// Like [`validate_token`] but also requires `token_type == Refresh`.
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != TokenType::Refresh {
        return Err(JwtError::WrongTokenType { expected: "refresh" });
    }
    Ok(claims)
}

/// Exchanges a valid refresh token for a fresh access token.
pub fn refresh_access_token(refresh_token: &str, secret: &str) -> Result<String, JwtError> {
    let refresh_claims = validate_refresh_token(refresh_token, secret)?;
    create_token(&Claims::new(refresh_claims.sub, TokenType::Access), secret)
}

/// Access and refresh token pair handed out on register and login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues both tokens for a user.
pub fn issue_token_pair(user_id: Uuid, secret: &str) -> Result<TokenPair, JwtError> {
    Ok(TokenPair {
        access_token: create_token(&Claims::new(user_id, TokenType::Access), secret)?,
        refresh_token: create_token(&Claims::new(user_id, TokenType::Refresh), secret)?,
    })
}
