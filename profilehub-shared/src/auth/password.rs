/// Password hashing with Argon2id
///
/// Hashes are PHC strings (`$argon2id$v=19$m=...`), so the parameters travel
/// with the hash and verification needs no configuration.
///
/// # Example
///
/// ```
/// use profilehub_shared::auth::password::{hash_password, verify_password};
///
/// let hash = hash_password("hunter2hunter2").unwrap();
/// assert!(verify_password("hunter2hunter2", &hash).unwrap());
/// assert!(!verify_password("hunter3hunter3", &hash).unwrap());
/// ```

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, ParamsBuilder, Version,
};

/// Minimum accepted password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format: {0}")]
    InvalidHash(String),
}

/// Hashes a password with a fresh random salt.
///
/// Parameters: 64 MiB memory, 3 iterations, 4 lanes, 32-byte output.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = ParamsBuilder::new()
        .m_cost(65536)
        .t_cost(3)
        .p_cost(4)
        .output_len(32)
        .build()
        .map_err(|e| PasswordError::HashError(format!("Invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Checks a password against a stored hash.
///
/// A wrong password is `Ok(false)`; only an unreadable hash or an internal
/// failure is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::InvalidHash(e.to_string()))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Rejects passwords shorter than [`MIN_PASSWORD_LENGTH`] characters.
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_format() {
        let hash = hash_password("test_password_123").expect("Hash should succeed");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("v=19"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
    }

    #[test]
    fn test_hash_password_uses_fresh_salt() {
        let first = hash_password("same_password").unwrap();
        let second = hash_password("same_password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct_password").unwrap();

        assert!(verify_password("correct_password", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
        assert!(!verify_password("", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_rejects_garbage_hash() {
        assert!(matches!(
            verify_password("password", "not-a-hash"),
            Err(PasswordError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_unicode_password() {
        let hash = hash_password("pässwörd-密码").unwrap();
        assert!(verify_password("pässwörd-密码", &hash).unwrap());
    }

    #[test]
    fn test_validate_password_strength() {
        assert!(validate_password_strength("12345678").is_ok());
        assert!(validate_password_strength("long enough passphrase").is_ok());

        let err = validate_password_strength("short").unwrap_err();
        assert!(err.contains("at least 8 characters"));
    }
}
