/// Image upload
///
/// ```text
/// POST /v1/uploads
/// Content-Type: multipart/form-data; boundary=...
///
/// image=<file>
/// ```
///
/// ```json
/// { "key": "uploads/1712345678901-482913374.png", "url": "https://..." }
/// ```
///
/// Uploading only stores the bytes. The key is attached to a profile by a
/// later register or update call.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use profilehub_shared::storage::key::{extension_for_content_type, generate_image_key};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Name of the multipart field carrying the file
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub key: String,
    pub url: String,
}

fn invalid_image(message: &str) -> ApiError {
    ApiError::ValidationError(vec![ValidationErrorDetail::new(IMAGE_FIELD, message)])
}

pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let max_bytes = state.config.api.max_upload_bytes;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let extension = extension_for_content_type(&content_type).ok_or_else(|| {
            invalid_image("Only JPEG, PNG, GIF and WEBP images are allowed")
        })?;

        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(invalid_image("Image is empty"));
        }
        if bytes.len() > max_bytes {
            return Err(ApiError::PayloadTooLarge(format!(
                "Image exceeds {} bytes",
                max_bytes
            )));
        }

        let key = generate_image_key(&state.config.storage.key_prefix, extension);
        state.store.put(&key, bytes.clone(), &content_type).await?;

        let url = state
            .store
            .presign_get(&key, state.config.storage.presign_ttl())
            .await?;

        info!(key = %key, size = bytes.len(), content_type = %content_type, "Stored uploaded image");
        return Ok((StatusCode::CREATED, Json(UploadResponse { key, url })));
    }

    Err(ApiError::BadRequest(format!(
        "Multipart field '{}' is required",
        IMAGE_FIELD
    )))
}
