/// HTTP client for the ProfileHub API
///
/// Every call goes through [`ApiClient::send`], which turns error bodies
/// into [`ClientError::Api`] and a 401 into [`ClientError::Unauthorized`].
/// A 401 expires the shared session only when the request carried the
/// session's own tokens; a rejected login leaves it alone.

use crate::{
    error::ClientError,
    session::{Session, SessionContext},
    types::{
        AuthResponse, DeleteResponse, ErrorBody, RefreshResponse, RegisterRequest,
        UpdateUserRequest, UploadResponse, User, UserList, UserProfile,
    },
};
use reqwest::{multipart, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: SessionContext,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: SessionContext) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, session)
    }

    /// Uses a preconfigured reqwest client (timeouts, proxies, TLS roots).
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: impl Into<String>,
        session: SessionContext,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, ClientError> {
        let token = self
            .session
            .access_token()
            .ok_or(ClientError::NotAuthenticated)?;
        Ok(builder.bearer_auth(token))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        uses_session: bool,
    ) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) if !body.message.is_empty() => body.message,
            Ok(body) if !body.error.is_empty() => body.error,
            _ => status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string(),
        };

        if status == StatusCode::UNAUTHORIZED {
            if uses_session {
                warn!(message = %message, "Session tokens rejected, expiring session");
                self.session.invalidate();
            }
            return Err(ClientError::Unauthorized(message));
        }

        debug!(status = status.as_u16(), message = %message, "API request failed");
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn start_session(&self, auth: AuthResponse) -> User {
        self.session.sign_in(Session {
            user_id: auth.user.id,
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
        });
        auth.user
    }

    /// Creates an account and signs in as it.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ClientError> {
        let auth: AuthResponse = self
            .send(self.http.post(self.url("/v1/users/register")).json(request), false)
            .await?;
        Ok(self.start_session(auth))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let auth: AuthResponse = self
            .send(
                self.http
                    .post(self.url("/v1/users/login"))
                    .json(&json!({ "email": email, "password": password })),
                false,
            )
            .await?;
        Ok(self.start_session(auth))
    }

    /// Forgets the local session. Tokens are stateless, so the server is
    /// not contacted.
    pub fn logout(&self) {
        self.session.sign_out();
    }

    /// Trades the refresh token for a new access token and stores it.
    pub async fn refresh(&self) -> Result<String, ClientError> {
        let refresh_token = self
            .session
            .refresh_token()
            .ok_or(ClientError::NotAuthenticated)?;

        let response: RefreshResponse = self
            .send(
                self.http
                    .post(self.url("/v1/users/refresh"))
                    .json(&json!({ "refresh_token": refresh_token })),
                true,
            )
            .await?;

        self.session
            .update_access_token(response.access_token.clone());
        Ok(response.access_token)
    }

    pub async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<UserList, ClientError> {
        let mut query = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit));
        }
        if let Some(offset) = offset {
            query.push(("offset", offset));
        }

        let builder = self.http.get(self.url("/v1/users")).query(&query);
        self.send(self.authorized(builder)?, true).await
    }

    pub async fn get_user(&self, id: Uuid) -> Result<UserProfile, ClientError> {
        let builder = self.http.get(self.url(&format!("/v1/users/{}", id)));
        self.send(self.authorized(builder)?, true).await
    }

    pub async fn update_user(
        &self,
        id: Uuid,
        request: &UpdateUserRequest,
    ) -> Result<UserProfile, ClientError> {
        let builder = self
            .http
            .put(self.url(&format!("/v1/users/{}", id)))
            .json(request);
        self.send(self.authorized(builder)?, true).await
    }

    /// Deletes a user. Deleting the signed-in user also signs out.
    pub async fn delete_user(&self, id: Uuid) -> Result<bool, ClientError> {
        let builder = self.http.delete(self.url(&format!("/v1/users/{}", id)));
        let response: DeleteResponse = self.send(self.authorized(builder)?, true).await?;

        if response.deleted {
            if let crate::SessionState::Authenticated(session) = self.session.state() {
                if session.user_id == id {
                    self.session.sign_out();
                }
            }
        }
        Ok(response.deleted)
    }

    /// Uploads an image. The returned key is attached to a profile through
    /// `register` or `update_user`.
    pub async fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, ClientError> {
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new().part("image", part);

        self.send(self.http.post(self.url("/v1/uploads")).multipart(form), false)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slashes_are_trimmed() {
        let client = ApiClient::new("http://localhost:8080//", SessionContext::new());
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/v1/users"), "http://localhost:8080/v1/users");
    }

    #[tokio::test]
    async fn test_protected_calls_need_a_session() {
        let client = ApiClient::new("http://127.0.0.1:1", SessionContext::new());

        let err = client.get_user(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));

        let err = client.refresh().await.unwrap_err();
        assert!(matches!(err, ClientError::NotAuthenticated));
    }
}
