use axum::Router;
use serde::Serialize;
use sqlx::PgPool;

use crate::{Config, Notifier};

mod devices;
mod health;
mod iot;

// ---

/// Shared state for every route: the connection pool, the immutable
/// configuration snapshot, and the Telegram dispatcher.
pub type AppState = (PgPool, Config, Notifier);

pub fn router(pool: PgPool, config: Config, notifier: Notifier) -> Router {
    // ---
    Router::new()
        .merge(iot::router())
        .merge(devices::router())
        .merge(health::router())
        .with_state((pool, config, notifier))
}

/// Uniform `{ success, data, error }` response envelope used by every
/// endpoint, mirrored by the dashboard client.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    // ---
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl Envelope<serde_json::Value> {
    /// Failure envelope carrying a stable error code and no data.
    pub fn error(code: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(code.into()),
        }
    }
}
