use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use swap_db::Ownership;
use swap_types::models::{Identity, Item, ItemFields};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

/// Upper bound on items handed out by one feed request.
pub const FEED_LIMIT: u32 = 10;

const MISSING_FIELDS: &str = "Missing required fields";

pub async fn create_item(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Json(fields), _): WithRejection<Json<ItemFields>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    if !fields.is_complete() {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    }

    let item = run_db(&state, "Failed to create item", move |db| {
        db.create_item(&identity, &fields)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn list_items(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let items = run_db(&state, "Failed to fetch items", move |db| {
        db.list_items(identity.user_id)
    })
    .await?;

    Ok(Json(items))
}

pub async fn get_item(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(item_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<Item>, ApiError> {
    let outcome = run_db(&state, "Failed to fetch item", move |db| {
        db.owned_item(identity.user_id, item_id)
    })
    .await?;

    owned(outcome, "view").map(Json)
}

pub async fn update_item(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(item_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(fields), _): WithRejection<Json<ItemFields>, ApiError>,
) -> Result<Json<Item>, ApiError> {
    if !fields.is_complete() {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    }

    let outcome = run_db(&state, "Failed to update item", move |db| {
        db.update_item(identity.user_id, item_id, &fields)
    })
    .await?;

    owned(outcome, "modify").map(Json)
}

/// Deleting an item cascades to its decisions and the matches built on it.
/// Open streams on those matches are told, then the image is removed.
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(item_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = run_db(&state, "Failed to delete item", move |db| {
        db.delete_item(identity.user_id, item_id)
    })
    .await?;
    let deleted = owned(outcome, "delete")?;

    state.dispatcher.publish_removed(&deleted.removed_matches).await;

    // Best-effort: the row is gone whether or not the file follows
    match state.storage.key_from_url(&deleted.image_url) {
        Some(key) => {
            if let Err(e) = state.storage.delete(&key).await {
                warn!("Failed to delete image {} for item {}: {}", key, item_id, e);
            }
        }
        None => warn!("Item {} image is not a stored object: {}", item_id, deleted.image_url),
    }

    Ok(Json(json!({ "success": true })))
}

/// Up to [`FEED_LIMIT`] of other people's items the caller has not
/// decided on yet, newest first.
pub async fn feed(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let items = run_db(&state, "Failed to fetch feed", move |db| {
        db.feed(identity.user_id, FEED_LIMIT)
    })
    .await?;

    Ok(Json(items))
}

/// `action` names what the caller attempted, for the 403 message.
fn owned<T>(outcome: Ownership<T>, action: &str) -> Result<T, ApiError> {
    match outcome {
        Ownership::Owned(value) => Ok(value),
        Ownership::NotOwner => Err(ApiError::forbidden(format!(
            "You do not have permission to {} this item",
            action
        ))),
        Ownership::Missing => Err(ApiError::not_found("Item not found")),
    }
}
