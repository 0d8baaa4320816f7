use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use swap_db::Database;
use swap_gateway::Dispatcher;

use crate::error::{ApiError, internal};
use crate::storage::Storage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub dispatcher: Dispatcher,
    pub storage: Storage,
    pub jwt_secret: String,
    /// Interval between `heartbeat` events on message streams
    pub heartbeat: Duration,
}

/// Run a blocking database call off the async runtime. Failures are logged
/// and surface as a 500 carrying `context`.
pub async fn run_db<F, T>(state: &AppState, context: &'static str, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(context)
        })?
        .map_err(internal(context))
}
