/// User endpoints
///
/// # Endpoints
///
/// - `POST   /v1/users/register`: create an account, returns tokens
/// - `POST   /v1/users/login`: exchange credentials for tokens
/// - `POST   /v1/users/refresh`: exchange a refresh token for an access token
/// - `GET    /v1/users`: paginated listing
/// - `GET    /v1/users/:id`: one profile with signed photo URLs
/// - `PUT    /v1/users/:id`: partial update, including the image list
/// - `DELETE /v1/users/:id`: remove the user and its images
///
/// Everything except register, login and refresh needs a bearer access
/// token. Any valid token may act on any user.

use crate::{
    app::AppState,
    error::{validation_details, ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use futures::future::join_all;
use profilehub_shared::{
    auth::{jwt, password},
    models::user::{normalize_email, CreateUser, UpdateUser, User, UserProfile},
    storage::key::validate_image_key,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    pub confirm_password: String,

    #[serde(default)]
    pub gender: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    #[serde(default)]
    pub education: Option<Vec<String>>,

    /// Keys returned by earlier uploads
    #[serde(default)]
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Partial update. Absent fields, and blank strings, leave the stored
/// value alone. `images`, when present, becomes the whole new image list.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub gender: Option<String>,
    pub city: Option<String>,
    pub education: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Serialize)]
pub struct ListUsersResponse {
    pub users: Vec<User>,
    pub total: i64,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

fn parse_user_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid user id".to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Drops blank entries and checks count and shape of every key.
fn check_image_list(
    images: Vec<String>,
    prefix: &str,
    max_images: usize,
    errors: &mut Vec<ValidationErrorDetail>,
) -> Vec<String> {
    let images: Vec<String> = images
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    if images.len() > max_images {
        errors.push(ValidationErrorDetail::new(
            "images",
            format!("At most {} images are allowed", max_images),
        ));
    }
    for key in &images {
        if let Err(e) = validate_image_key(key, prefix) {
            errors.push(ValidationErrorDetail::new("images", format!("{}: {}", key, e)));
        }
    }
    images
}

/// Signs a read URL for every image key; keys that fail are skipped.
pub(crate) async fn with_photos(state: &AppState, user: User) -> UserProfile {
    let ttl = state.config.storage.presign_ttl();

    let signed = join_all(
        user.image_keys
            .iter()
            .map(|key| async move { (key, state.store.presign_get(key, ttl).await) }),
    )
    .await;

    let photos = signed
        .into_iter()
        .filter_map(|(key, result)| match result {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(user_id = %user.id, key = %key, error = %e, "Could not sign photo URL");
                None
            }
        })
        .collect();

    UserProfile { user, photos }
}

/// Register a new user
///
/// ```text
/// POST /v1/users/register
///
/// {
///   "email": "ada@example.com",
///   "password": "correct horse",
///   "confirm_password": "correct horse",
///   "city": "London",
///   "images": ["uploads/1712345678901-482913374.png"]
/// }
/// ```
///
/// # Errors
///
/// - `409 Conflict`: email already registered
/// - `422 Unprocessable Entity`: invalid email, short or mismatched
///   password, too many or malformed image keys
pub async fn register(
    State(state): State<AppState>,
    Json(mut req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.email = normalize_email(&req.email);

    let mut errors = match req.validate() {
        Ok(()) => Vec::new(),
        Err(e) => validation_details(&e),
    };
    if req.password != req.confirm_password {
        errors.push(ValidationErrorDetail::new(
            "confirm_password",
            "Passwords do not match",
        ));
    }
    let images = check_image_list(
        req.images.take().unwrap_or_default(),
        &state.config.storage.key_prefix,
        state.config.api.max_images,
        &mut errors,
    );
    if !errors.is_empty() {
        return Err(ApiError::ValidationError(errors));
    }

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email,
            password_hash,
            gender: non_blank(req.gender).unwrap_or_default(),
            city: non_blank(req.city).unwrap_or_default(),
            education: req.education.unwrap_or_default(),
            image_keys: images,
        },
    )
    .await?;

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;
    info!(user_id = %user.id, "Registered user");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }),
    ))
}

/// Log in
///
/// Unknown email and wrong password produce the same 401 so the response
/// does not reveal which accounts exist.
pub async fn login(
    State(state): State<AppState>,
    Json(mut req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.email = normalize_email(&req.email);
    req.validate()
        .map_err(|e| ApiError::ValidationError(validation_details(&e)))?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let mut user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        return Err(invalid());
    }

    User::update_last_login(&state.db, user.id).await?;
    user.last_login_at = Some(chrono::Utc::now());

    let tokens = jwt::issue_token_pair(user.id, state.jwt_secret())?;

    Ok(Json(AuthResponse {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

/// Exchange a refresh token for a new access token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;
    Ok(Json(RefreshResponse { access_token }))
}

/// List users, newest first
///
/// `limit` defaults to 50 and is clamped to 1..=100; `offset` defaults to 0.
pub async fn list_users(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListUsersResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = params.offset.unwrap_or(0).max(0);

    let (users, total) = tokio::try_join!(
        User::list(&state.db, limit, offset),
        User::count(&state.db)
    )?;

    Ok(Json(ListUsersResponse { users, total }))
}

/// Fetch one user with signed photo URLs
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserProfile>> {
    let id = parse_user_id(&id)?;

    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(with_photos(&state, user).await))
}

/// Update a user
///
/// When `images` is present the new list is validated first; a single bad
/// key rejects the whole request before anything is deleted. Otherwise the
/// keys dropped from the old list are deleted from the blob store while the
/// new list is written. Failed deletes are logged and do not fail the
/// request. A failed write does, with a generic 500, and deletes already
/// issued stay done.
///
/// The user's lock is held from the read to the write.
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserProfile>> {
    let id = parse_user_id(&id)?;

    let mut errors = Vec::new();
    let mut changes = UpdateUser::default();

    if let Some(email) = non_blank(req.email) {
        let email = normalize_email(&email);
        if !validator::ValidateEmail::validate_email(&email) {
            errors.push(ValidationErrorDetail::new("email", "Invalid email format"));
        }
        changes.email = Some(email);
    }
    let new_password = req.password.filter(|p| !p.is_empty());
    if let Some(Err(message)) = new_password
        .as_deref()
        .map(password::validate_password_strength)
    {
        errors.push(ValidationErrorDetail::new("password", message));
    }
    changes.gender = non_blank(req.gender);
    changes.city = non_blank(req.city);
    changes.education = req.education;

    let desired_images = req.images.map(|images| {
        check_image_list(
            images,
            &state.config.storage.key_prefix,
            state.config.api.max_images,
            &mut errors,
        )
    });

    if !errors.is_empty() {
        return Err(ApiError::ValidationError(errors));
    }

    if let Some(plain) = new_password {
        changes.password_hash = Some(password::hash_password(&plain)?);
    }

    let _guard = state.locks.lock(id).await;

    let current = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    // A clash found here must not reach commit, which deletes while it writes.
    if let Some(email) = &changes.email {
        if let Some(owner) = User::find_by_email(&state.db, email).await? {
            if owner.id != id {
                return Err(ApiError::Conflict("Email already registered".to_string()));
            }
        }
    }

    let persisted = match desired_images {
        Some(desired) => {
            changes.image_keys = Some(desired.clone());
            let write = User::update(&state.db, id, changes);

            let (updated, reconciliation) = state
                .reconciler
                .commit(&current.image_keys, desired, write)
                .await
                .map_err(persistence_error)?;

            if !reconciliation.is_clean() {
                warn!(
                    user_id = %id,
                    orphaned = reconciliation.failed.len(),
                    "Some dropped images could not be deleted"
                );
            }
            updated
        }
        None => User::update(&state.db, id, changes)
            .await
            .map_err(persistence_error)?,
    };

    let user = persisted.ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(Json(with_photos(&state, user).await))
}

/// Email clashes stay 409; every other write failure is a generic 500.
fn persistence_error(err: sqlx::Error) -> ApiError {
    match ApiError::from(err) {
        conflict @ ApiError::Conflict(_) => conflict,
        other => ApiError::UpdateFailed(other.to_string()),
    }
}

/// Delete a user
///
/// Every stored image is deleted concurrently with removing the record.
/// Image delete failures are logged and leave orphans behind.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let id = parse_user_id(&id)?;

    let _guard = state.locks.lock(id).await;

    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let (purged, deleted) = tokio::join!(
        state.reconciler.purge(&user.image_keys),
        User::delete(&state.db, id)
    );

    if !deleted? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    info!(
        user_id = %id,
        images_deleted = purged.deleted.len(),
        images_orphaned = purged.failed.len(),
        "Deleted user"
    );
    Ok(Json(DeleteResponse { deleted: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[&str]) -> Vec<String> {
        list.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn test_parse_user_id() {
        assert!(parse_user_id("not-a-uuid").is_err());
        assert!(parse_user_id(&Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  Porto ".into())), Some("Porto".to_string()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_check_image_list_drops_blank_entries() {
        let mut errors = Vec::new();
        let images = check_image_list(
            keys(&["uploads/1-1.png", "", "  ", "uploads/1-2.png"]),
            "uploads/",
            4,
            &mut errors,
        );

        assert!(errors.is_empty());
        assert_eq!(images, keys(&["uploads/1-1.png", "uploads/1-2.png"]));
    }

    #[test]
    fn test_check_image_list_limits_count() {
        let mut errors = Vec::new();
        check_image_list(
            keys(&["uploads/1", "uploads/2", "uploads/3", "uploads/4", "uploads/5"]),
            "uploads/",
            4,
            &mut errors,
        );

        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("At most 4"));
    }

    #[test]
    fn test_check_image_list_rejects_foreign_keys() {
        let mut errors = Vec::new();
        check_image_list(
            keys(&["uploads/ok.png", "../etc/passwd", "avatars/x.png"]),
            "uploads/",
            4,
            &mut errors,
        );

        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| e.field == "images"));
    }

    #[test]
    fn test_duplicate_keys_are_kept() {
        let mut errors = Vec::new();
        let images = check_image_list(
            keys(&["uploads/a.png", "uploads/a.png"]),
            "uploads/",
            4,
            &mut errors,
        );
        assert_eq!(images.len(), 2);
    }
}
