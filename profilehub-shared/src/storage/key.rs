/// Image key generation and validation
///
/// Keys look like `uploads/1712345678901-482913374.png`: a namespace prefix,
/// the upload time in Unix milliseconds, a random number below one billion,
/// and an extension derived from the content type.

use rand::Rng;

/// Namespace every generated key lives under unless configured otherwise
pub const DEFAULT_KEY_PREFIX: &str = "uploads/";

/// Longest key accepted anywhere
pub const MAX_KEY_LENGTH: usize = 255;

/// Content types accepted for upload
pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("image key is empty")]
    Empty,

    #[error("image key exceeds {} bytes", MAX_KEY_LENGTH)]
    TooLong,

    #[error("image key must start with '{0}'")]
    WrongPrefix(String),

    #[error("image key contains a path traversal or absolute path")]
    PathTraversal,

    #[error("image key contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Normalizes a configured prefix so it is either empty or ends with `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// File extension (with leading dot) for an allowed image content type.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        _ => None,
    }
}

/// Builds a fresh key under `prefix`.
///
/// `prefix` is used verbatim, so pass it through [`normalize_prefix`] first.
pub fn generate_image_key(prefix: &str, extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}{}-{}{}", prefix, millis, nonce, extension)
}

/// Checks that a key is safe to use as a storage path.
///
/// Rejects empty and overlong keys, `..` segments, backslashes, leading
/// slashes and anything outside `[A-Za-z0-9/._-]`.
pub fn validate_key_syntax(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(KeyError::TooLong);
    }
    if key.starts_with('/') || key.contains('\\') || key.split('/').any(|seg| seg == "..") {
        return Err(KeyError::PathTraversal);
    }
    if let Some(c) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-')))
    {
        return Err(KeyError::InvalidCharacter(c));
    }
    Ok(())
}

/// Checks a client-supplied image key: valid syntax, under `prefix`, and
/// something after the prefix.
pub fn validate_image_key(key: &str, prefix: &str) -> Result<(), KeyError> {
    validate_key_syntax(key)?;

    match key.strip_prefix(prefix) {
        Some(rest) if !rest.is_empty() && !rest.starts_with('/') => Ok(()),
        _ => Err(KeyError::WrongPrefix(prefix.to_string())),
    }
}
