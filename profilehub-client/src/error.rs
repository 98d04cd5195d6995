/// Client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The call needs a signed-in session and there is none
    #[error("Not signed in")]
    NotAuthenticated,

    /// The server answered 401. The session has been marked expired.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success status, with the server's message
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// HTTP status behind the error, when there was a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Unauthorized(_) => Some(401),
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            ClientError::NotAuthenticated => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        let err = ClientError::Api {
            status: 409,
            message: "Email already registered".into(),
        };
        assert_eq!(err.status(), Some(409));
        assert_eq!(err.to_string(), "API error (409): Email already registered");

        assert_eq!(ClientError::Unauthorized("x".into()).status(), Some(401));
        assert_eq!(ClientError::NotAuthenticated.status(), None);
    }
}
