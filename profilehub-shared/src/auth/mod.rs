/// Authentication utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and verification
/// - [`jwt`]: HS256 access/refresh tokens
/// - [`middleware`]: bearer-token extraction producing an [`middleware::AuthContext`]
///
/// # Example
///
/// ```no_run
/// use profilehub_shared::auth::password::{hash_password, verify_password};
/// use profilehub_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("correct horse battery")?;
/// assert!(verify_password("correct horse battery", &hash)?);
///
/// let claims = Claims::new(Uuid::new_v4(), TokenType::Access);
/// let token = create_token(&claims, "a-secret-that-is-at-least-32-bytes!")?;
/// validate_access_token(&token, "a-secret-that-is-at-least-32-bytes!")?;
/// # Ok(())
/// # }
/// ```

pub mod jwt;
pub mod middleware;
pub mod password;
