use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use serde::Deserialize;
use tracing::debug;

use crate::auth::verify_token;
use crate::error::ApiError;
use crate::state::AppState;

/// `EventSource` cannot set headers, so streams may pass the token here.
#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Resolve the caller from the bearer token and attach it as an
/// `Extension<Identity>`. Anything else is a 401.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;

    let identity = verify_token(&state.jwt_secret, &token).map_err(|e| {
        debug!("Rejected token: {}", e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    if let Some(auth) = req.headers().typed_get::<Authorization<Bearer>>() {
        return Some(auth.token().to_string());
    }

    Query::<TokenQuery>::try_from_uri(req.uri())
        .ok()
        .and_then(|Query(q)| q.access_token)
        .filter(|t| !t.is_empty())
}
