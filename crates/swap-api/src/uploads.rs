use axum::{
    Extension, Json,
    extract::{Multipart, State},
};
use axum_extra::extract::WithRejection;
use tracing::info;

use swap_types::api::UploadResponse;
use swap_types::models::Identity;

use crate::error::{ApiError, internal};
use crate::state::AppState;
use crate::storage::generate_key;

/// Largest accepted image, in bytes.
pub const MAX_FILE_SIZE: usize = 20 * 1024 * 1024;

/// Request body cap for the upload route: the file plus form overhead.
pub const MAX_BODY_SIZE: usize = MAX_FILE_SIZE + 1024 * 1024;

pub const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/avif",
];

/// Accept a single image in the multipart field `file` and store it.
pub async fn upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(mut multipart, _): WithRejection<Multipart, ApiError>,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        if !ALLOWED_TYPES.contains(&content_type.as_str()) {
            return Err(ApiError::bad_request(
                "File type not supported. Use JPEG, PNG, WebP, GIF or AVIF.",
            ));
        }

        let bytes = field.bytes().await.map_err(|e| ApiError::bad_request(e.body_text()))?;
        if bytes.len() > MAX_FILE_SIZE {
            return Err(ApiError::bad_request("File is too large. Maximum size is 20MB."));
        }
        if bytes.is_empty() {
            break;
        }

        return store(&state, &identity, &bytes, file_name.as_deref(), &content_type).await;
    }

    Err(ApiError::bad_request("No file provided"))
}

async fn store(
    state: &AppState,
    identity: &Identity,
    bytes: &[u8],
    file_name: Option<&str>,
    content_type: &str,
) -> Result<Json<UploadResponse>, ApiError> {
    let key = generate_key(file_name, content_type);
    state
        .storage
        .put(&key, bytes)
        .await
        .map_err(internal("Failed to upload file"))?;

    info!("User {} uploaded {}", identity.user_id, key);

    Ok(Json(UploadResponse {
        success: true,
        url: state.storage.public_url(&key),
        key,
    }))
}
