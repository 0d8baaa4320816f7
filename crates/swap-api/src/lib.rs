pub mod auth;
pub mod decisions;
pub mod error;
pub mod items;
pub mod matches;
pub mod messages;
pub mod middleware;
pub mod state;
pub mod storage;
pub mod stream;
pub mod uploads;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::services::ServeDir;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Every API route. `/health` and `/media` are public; the rest require a
/// bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/items", get(items::list_items).post(items::create_item))
        .route("/items/feed", get(items::feed))
        .route(
            "/items/{item_id}",
            get(items::get_item)
                .put(items::update_item)
                .delete(items::delete_item),
        )
        .route("/decisions", post(decisions::record_decision))
        .route("/decisions/history", get(decisions::history))
        .route("/decisions/{decision_id}", delete(decisions::undo_decision))
        .route("/matches", get(matches::list_matches))
        .route(
            "/matches/{match_id}",
            get(matches::get_match).delete(matches::unmatch),
        )
        .route(
            "/matches/{match_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route(
            "/matches/{match_id}/messages/stream",
            get(stream::stream_messages),
        )
        .route(
            "/upload",
            post(uploads::upload).layer(DefaultBodyLimit::max(uploads::MAX_BODY_SIZE)),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .nest_service("/media", ServeDir::new(state.storage.dir()))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
