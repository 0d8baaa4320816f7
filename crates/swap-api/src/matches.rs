use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde_json::json;
use uuid::Uuid;

use swap_types::api::MatchSummary;
use swap_types::models::{Identity, Match};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

pub const MATCH_NOT_FOUND: &str = "Match not found or you do not have access to it";

pub async fn list_matches(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<MatchSummary>>, ApiError> {
    let matches = run_db(&state, "Failed to fetch matches", move |db| {
        db.list_matches(identity.user_id)
    })
    .await?;

    Ok(Json(matches))
}

pub async fn get_match(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(match_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<Match>, ApiError> {
    let found = run_db(&state, "Failed to fetch match", move |db| {
        db.find_match_for(identity.user_id, match_id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found(MATCH_NOT_FOUND))?;

    Ok(Json(found))
}

/// Dissolve the relationship between the two participants: every match
/// between them and every decision either made on the other's items.
pub async fn unmatch(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(match_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = run_db(&state, "Failed to delete match", move |db| {
        db.unmatch(identity.user_id, match_id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found(MATCH_NOT_FOUND))?;

    state.dispatcher.publish_removed(&outcome.removed_matches).await;

    Ok(Json(json!({ "success": true })))
}
