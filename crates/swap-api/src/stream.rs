//! Server-Sent Events feed of a match's messages.
//!
//! The stream subscribes to the match's channel on the [`Dispatcher`] and
//! re-reads storage from its cursor whenever something is published there.
//! Storage stays the source of truth; notifications only say "look again".
//!
//! [`Dispatcher`]: swap_gateway::Dispatcher

use std::convert::Infallible;

use axum::{
    Extension,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};
use uuid::Uuid;

use swap_types::api::MessageResponse;
use swap_types::events::MatchEvent;
use swap_types::models::Identity;

use crate::error::ApiError;
use crate::matches::MATCH_NOT_FOUND;
use crate::messages::parse_cursor;
use crate::state::{AppState, run_db};

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_MESSAGES: &str = "messages";
pub const EVENT_ERROR: &str = "error";
pub const EVENT_HEARTBEAT: &str = "heartbeat";

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub last_message_time: Option<String>,
}

enum Wake {
    Notified(Result<MatchEvent, RecvError>),
    Heartbeat,
}

pub async fn stream_messages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    WithRejection(Path(match_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(query), _): WithRejection<Query<StreamQuery>, ApiError>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let reader = identity.user_id;
    let mut cursor = parse_cursor(query.last_message_time.as_deref());

    let stream = async_stream::stream! {
        let membership = run_db(&state, "Failed to fetch match", move |db| {
            db.find_match_for(reader, match_id)
        })
        .await;
        match membership {
            Ok(Some(_)) => {}
            Ok(None) => {
                yield Ok(error_event(MATCH_NOT_FOUND));
                return;
            }
            Err(e) => {
                yield Ok(error_event(&e.to_string()));
                return;
            }
        }

        // Subscribe before the backlog read so nothing lands in between
        let mut rx = state.dispatcher.subscribe(match_id).await;
        debug!("User {} streaming match {}", reader, match_id);
        yield Ok(json_event(EVENT_CONNECTED, &json!({ "match_id": match_id })));

        let mut heartbeat = tokio::time::interval(state.heartbeat);
        heartbeat.tick().await;

        let mut pending_fetch = true;
        loop {
            if pending_fetch {
                pending_fetch = false;
                match fetch_batch(&state, reader, match_id, cursor).await {
                    Ok(Some(batch)) if batch.is_empty() => {}
                    Ok(Some(batch)) => {
                        cursor = batch.last().map(|m| m.message.created_at).or(cursor);
                        yield Ok(json_event(EVENT_MESSAGES, &batch));
                    }
                    Ok(None) => {
                        yield Ok(error_event("Match no longer exists"));
                        break;
                    }
                    Err(e) => {
                        yield Ok(error_event(&e.to_string()));
                    }
                }
            }

            let wake = tokio::select! {
                received = rx.recv() => Wake::Notified(received),
                _ = heartbeat.tick() => Wake::Heartbeat,
            };

            match wake {
                Wake::Notified(Ok(MatchEvent::MessageCreated { .. })) => pending_fetch = true,
                Wake::Notified(Ok(MatchEvent::MatchRemoved { .. })) => {
                    yield Ok(error_event("Match no longer exists"));
                    break;
                }
                Wake::Notified(Err(RecvError::Lagged(skipped))) => {
                    warn!("Stream for match {} lagged by {} event(s), catching up", match_id, skipped);
                    pending_fetch = true;
                }
                Wake::Notified(Err(RecvError::Closed)) => break,
                Wake::Heartbeat => {
                    yield Ok(json_event(EVENT_HEARTBEAT, &json!({ "time": Utc::now() })));
                }
            }
        }
        debug!("Stream for match {} closed", match_id);
    };

    Sse::new(stream)
}

async fn fetch_batch(
    state: &AppState,
    reader: Uuid,
    match_id: Uuid,
    since: Option<DateTime<Utc>>,
) -> Result<Option<Vec<MessageResponse>>, ApiError> {
    let messages = run_db(state, "Failed to fetch messages", move |db| {
        db.read_messages(reader, match_id, since)
    })
    .await?;

    Ok(messages.map(|batch| {
        batch
            .into_iter()
            .map(|m| MessageResponse::for_reader(m, reader))
            .collect()
    }))
}

fn json_event<T: serde::Serialize>(name: &'static str, payload: &T) -> Event {
    match serde_json::to_string(payload) {
        Ok(data) => Event::default().event(name).data(data),
        Err(e) => {
            error!("Failed to encode {} event: {}", name, e);
            error_event("Failed to encode event")
        }
    }
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event(EVENT_ERROR)
        .data(json!({ "error": message }).to_string())
}
