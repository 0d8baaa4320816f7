use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use swap_types::api::{MessageResponse, SendMessageRequest};
use swap_types::events::MatchEvent;
use swap_types::models::Identity;

use crate::error::ApiError;
use crate::matches::MATCH_NOT_FOUND;
use crate::state::{AppState, run_db};

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Only messages strictly newer than this RFC 3339 timestamp.
    pub since: Option<String>,
}

/// Lenient timestamp parsing for query cursors: a value that does not parse
/// is dropped (and logged) rather than failing the request.
pub fn parse_cursor(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|s| !s.is_empty())?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring unparseable timestamp {:?}: {}", raw, e);
            None
        }
    }
}

/// Messages of a match, oldest first. Reading flags the counterpart's
/// unread messages in the batch as read.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(match_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(query), _): WithRejection<Query<MessageQuery>, ApiError>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let since = parse_cursor(query.since.as_deref());
    let reader = identity.user_id;

    let messages = run_db(&state, "Failed to fetch messages", move |db| {
        db.read_messages(reader, match_id, since)
    })
    .await?
    .ok_or_else(|| ApiError::not_found(MATCH_NOT_FOUND))?;

    Ok(Json(
        messages
            .into_iter()
            .map(|m| MessageResponse::for_reader(m, reader))
            .collect(),
    ))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(match_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::bad_request("Message content is required"));
    }

    let sender = identity.user_id;
    let message = run_db(&state, "Failed to send message", move |db| {
        db.post_message(sender, match_id, &content)
    })
    .await?
    .ok_or_else(|| ApiError::not_found(MATCH_NOT_FOUND))?;

    state
        .dispatcher
        .publish(MatchEvent::MessageCreated {
            match_id,
            message_id: message.id,
            sender_id: sender,
        })
        .await;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::for_reader(message, sender)),
    ))
}
