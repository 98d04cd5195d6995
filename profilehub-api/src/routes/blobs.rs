/// Signed blob downloads
///
/// ```text
/// GET /v1/blobs/{key}?expires={unix_seconds}&signature={hex}
/// ```
///
/// The URL is produced by the blob store's `presign_get`. A missing,
/// expired or forged signature is a 403; a valid signature for an object
/// that no longer exists is a 404.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
};
use profilehub_shared::storage::DEFAULT_CONTENT_TYPE;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

pub async fn serve_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> ApiResult<Response> {
    let (Some(expires), Some(signature)) = (query.expires, query.signature) else {
        return Err(ApiError::Forbidden("Missing URL signature".to_string()));
    };

    state
        .signer
        .verify(&key, expires, &signature)
        .map_err(|e| {
            tracing::debug!(key = %key, error = %e, "Rejected blob URL");
            ApiError::Forbidden(e.to_string())
        })?;

    let blob = state.store.get(&key).await?;

    let content_type = HeaderValue::from_str(&blob.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, max-age=300")),
        ],
        blob.bytes,
    )
        .into_response())
}
