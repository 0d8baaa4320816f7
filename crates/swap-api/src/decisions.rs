use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use serde_json::json;
use uuid::Uuid;

use swap_db::RecordOutcome;
use swap_types::api::{DecisionHistoryEntry, RecordDecisionRequest, RecordDecisionResponse};
use swap_types::models::Identity;

use crate::error::ApiError;
use crate::state::{AppState, run_db};

pub async fn record_decision(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Json(req), _): WithRejection<Json<RecordDecisionRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let (Some(item_id), Some(liked)) = (req.item_id, req.liked) else {
        return Err(ApiError::bad_request("Missing required fields"));
    };

    let outcome = run_db(&state, "Failed to process decision", move |db| {
        db.record_decision(&identity, item_id, liked)
    })
    .await?;

    let recorded = match outcome {
        RecordOutcome::Recorded(recorded) => recorded,
        RecordOutcome::ItemMissing => return Err(ApiError::not_found("Item not found")),
        RecordOutcome::OwnItem => {
            return Err(ApiError::bad_request("Cannot make a decision on your own item"));
        }
    };

    state.dispatcher.publish_removed(&recorded.removed_matches).await;

    Ok((
        StatusCode::CREATED,
        Json(RecordDecisionResponse {
            decision: recorded.decision,
            matched: recorded.matched,
        }),
    ))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<DecisionHistoryEntry>>, ApiError> {
    let entries = run_db(&state, "Failed to fetch decision history", move |db| {
        db.decision_history(identity.user_id)
    })
    .await?;

    Ok(Json(entries))
}

/// Take back a decision. A match that depended on it goes with it, along
/// with that match's messages.
pub async fn undo_decision(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(decision_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = run_db(&state, "Failed to undo decision", move |db| {
        db.undo_decision(identity.user_id, decision_id)
    })
    .await?
    .ok_or_else(|| {
        ApiError::not_found("Decision not found or you do not have permission to undo it")
    })?;

    state.dispatcher.publish_removed(&outcome.removed_matches).await;

    Ok(Json(json!({ "success": true })))
}
