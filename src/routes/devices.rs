// src/routes/devices.rs
//! Dashboard query endpoints: device listing, reading history, latest
//! reading, and direct threshold configuration edits.
//!
//! These are plain request/response wrappers over the store. The config
//! endpoints apply the same default-substitution rule as the ingestion
//! path so the dashboard and the sensors always agree on the effective
//! thresholds.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use tracing::error;

use super::{AppState, Envelope};
use crate::models::{
    Device, ResolvedConfig, WaterReading, DEFAULT_MAX_LEVEL_PERCENT, DEFAULT_MIN_LEVEL_PERCENT,
};
use crate::store;

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{device_id}/latest", get(latest_reading))
        .route("/api/devices/{device_id}/readings", get(reading_history))
        .route(
            "/api/devices/{device_id}/config",
            get(get_config).put(update_config),
        )
}

fn internal_error(context: &str, e: sqlx::Error) -> axum::response::Response {
    // ---
    error!("{context}: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope::error("INTERNAL_ERROR")),
    )
        .into_response()
}

// ---

/// Handle `GET /api/devices`: every registered device, oldest first.
async fn list_devices(State((pool, _, _)): State<AppState>) -> impl IntoResponse {
    // ---
    let devices: Result<Vec<Device>, _> = sqlx::query_as(
        r#"
        SELECT id, device_id, name, location, created_at, updated_at
        FROM devices
        ORDER BY id ASC
        "#,
    )
    .fetch_all(&pool)
    .await;

    match devices {
        Ok(devices) => (StatusCode::OK, Json(Envelope::ok(devices))).into_response(),
        Err(e) => internal_error("list_devices", e),
    }
}

/// Handle `GET /api/devices/{device_id}/latest`: the most recent reading,
/// or `null` when the device has never reported.
async fn latest_reading(
    Path(device_id): Path<String>,
    State((pool, _, _)): State<AppState>,
) -> impl IntoResponse {
    // ---
    let latest: Result<Option<WaterReading>, _> = sqlx::query_as(
        r#"
        SELECT id, device_id, water_level_cm, water_level_percent, status, created_at
        FROM water_readings
        WHERE device_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(&device_id)
    .fetch_optional(&pool)
    .await;

    match latest {
        Ok(latest) => (
            StatusCode::OK,
            Json(Envelope {
                success: true,
                data: latest,
                error: None,
            }),
        )
            .into_response(),
        Err(e) => internal_error("latest_reading", e),
    }
}

// ---

/// Query parameters for the reading history endpoint.
#[derive(Debug, Deserialize)]
struct HistoryQuery {
    // ---
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// One page of reading history.
#[derive(Debug, Serialize)]
struct HistoryPage {
    // ---
    items: Vec<WaterReading>,
    total: i64,
    limit: i64,
    offset: i64,
}

/// Handle `GET /api/devices/{device_id}/readings?from&to&limit&offset`:
/// paged history, newest first. The limit is capped at 1000.
async fn reading_history(
    Path(device_id): Path<String>,
    Query(params): Query<HistoryQuery>,
    State((pool, _, _)): State<AppState>,
) -> impl IntoResponse {
    // ---
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let offset = params.offset.unwrap_or(0).max(0);

    let page = fetch_history(&pool, &device_id, &params, limit, offset).await;

    match page {
        Ok(page) => (StatusCode::OK, Json(Envelope::ok(page))).into_response(),
        Err(e) => internal_error("reading_history", e),
    }
}

async fn fetch_history(
    pool: &PgPool,
    device_id: &str,
    params: &HistoryQuery,
    limit: i64,
    offset: i64,
) -> Result<HistoryPage, sqlx::Error> {
    // ---
    let items: Vec<WaterReading> = sqlx::query_as(
        r#"
        SELECT id, device_id, water_level_cm, water_level_percent, status, created_at
        FROM water_readings
        WHERE device_id = $1
          AND ($2::timestamptz IS NULL OR created_at >= $2)
          AND ($3::timestamptz IS NULL OR created_at <= $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(device_id)
    .bind(params.from)
    .bind(params.to)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let (total,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM water_readings
        WHERE device_id = $1
          AND ($2::timestamptz IS NULL OR created_at >= $2)
          AND ($3::timestamptz IS NULL OR created_at <= $3)
        "#,
    )
    .bind(device_id)
    .bind(params.from)
    .bind(params.to)
    .fetch_one(pool)
    .await?;

    Ok(HistoryPage {
        items,
        total,
        limit,
        offset,
    })
}

// ---

/// Threshold configuration as shown to the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigView {
    // ---
    device_id: String,
    min_level_percent: f64,
    max_level_percent: f64,
    alert_enabled: bool,
    telegram_chat_id: Option<String>,
    is_default: bool,
}

type ConfigRow = (Option<f64>, Option<f64>, Option<bool>, Option<String>);

/// Handle `GET /api/devices/{device_id}/config`.
///
/// Read-only: when no row exists the system defaults are returned with
/// `isDefault: true` and nothing is persisted.
async fn get_config(
    Path(device_id): Path<String>,
    State((pool, _, _)): State<AppState>,
) -> impl IntoResponse {
    // ---
    let row: Result<Option<ConfigRow>, _> = sqlx::query_as(
        r#"
        SELECT min_level_percent, max_level_percent, alert_enabled, telegram_chat_id
        FROM alert_config
        WHERE device_id = $1
        LIMIT 1
        "#,
    )
    .bind(&device_id)
    .fetch_optional(&pool)
    .await;

    let row = match row {
        Ok(row) => row,
        Err(e) => return internal_error("get_config", e),
    };

    let is_default = row.is_none();
    let resolved = match row {
        Some((min, max, enabled, chat_id)) => ResolvedConfig::resolve(min, max, enabled, chat_id),
        None => ResolvedConfig::default(),
    };

    let view = ConfigView {
        device_id,
        min_level_percent: resolved.min_level_percent,
        max_level_percent: resolved.max_level_percent,
        alert_enabled: resolved.alert_enabled,
        telegram_chat_id: resolved.telegram_chat_id,
        is_default,
    };

    (StatusCode::OK, Json(Envelope::ok(view))).into_response()
}

// ---

/// Body of a configuration edit. Fields left out of the request keep
/// their stored values; an explicit `null` chat id clears the target.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateConfigBody {
    // ---
    min_level_percent: Option<f64>,
    max_level_percent: Option<f64>,
    alert_enabled: Option<bool>,
    #[serde(default, deserialize_with = "present")]
    telegram_chat_id: Option<Option<String>>,
}

/// Distinguish "field absent" (outer `None`) from "field null"
/// (`Some(None)`) for the chat id.
fn present<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Handle `PUT /api/devices/{device_id}/config`.
///
/// Ensures the device row exists, then upserts the configuration in the
/// same transaction. Fields missing from the request fall back to the
/// stored value when one exists, else to the system default.
async fn update_config(
    Path(device_id): Path<String>,
    State((pool, _, _)): State<AppState>,
    Json(body): Json<UpdateConfigBody>,
) -> impl IntoResponse {
    // ---
    match apply_config_update(&pool, &device_id, body).await {
        Ok(view) => (StatusCode::OK, Json(Envelope::ok(view))).into_response(),
        Err(e) => internal_error("update_config", e),
    }
}

async fn apply_config_update(
    pool: &PgPool,
    device_id: &str,
    body: UpdateConfigBody,
) -> Result<ConfigView, sqlx::Error> {
    // ---
    let mut tx = pool.begin().await?;

    store::ensure_device(&mut tx, device_id).await?;

    let stored: Option<ConfigRow> = sqlx::query_as(
        r#"
        SELECT min_level_percent, max_level_percent, alert_enabled, telegram_chat_id
        FROM alert_config
        WHERE device_id = $1
        LIMIT 1
        "#,
    )
    .bind(device_id)
    .fetch_optional(&mut *tx)
    .await?;

    let (stored_min, stored_max, stored_enabled, stored_chat_id) =
        stored.unwrap_or((None, None, None, None));

    let final_min = body
        .min_level_percent
        .or(stored_min)
        .unwrap_or(DEFAULT_MIN_LEVEL_PERCENT);
    let final_max = body
        .max_level_percent
        .or(stored_max)
        .unwrap_or(DEFAULT_MAX_LEVEL_PERCENT);
    let final_enabled = body.alert_enabled.or(stored_enabled).unwrap_or(true);
    let final_chat_id = match body.telegram_chat_id {
        Some(submitted) => submitted,
        None => stored_chat_id,
    };

    sqlx::query(
        r#"
        INSERT INTO alert_config
            (device_id, min_level_percent, max_level_percent, alert_enabled, telegram_chat_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (device_id) DO UPDATE SET
            min_level_percent = EXCLUDED.min_level_percent,
            max_level_percent = EXCLUDED.max_level_percent,
            alert_enabled     = EXCLUDED.alert_enabled,
            telegram_chat_id  = EXCLUDED.telegram_chat_id,
            updated_at        = NOW()
        "#,
    )
    .bind(device_id)
    .bind(final_min)
    .bind(final_max)
    .bind(final_enabled)
    .bind(&final_chat_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ConfigView {
        device_id: device_id.to_string(),
        min_level_percent: final_min,
        max_level_percent: final_max,
        alert_enabled: final_enabled,
        telegram_chat_id: final_chat_id,
        is_default: false,
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn update_body_distinguishes_absent_and_null_chat_id() {
        // ---
        let absent: UpdateConfigBody = serde_json::from_str(r#"{"minLevelPercent": 30}"#).unwrap();
        assert_eq!(absent.min_level_percent, Some(30.0));
        assert!(absent.telegram_chat_id.is_none());

        let cleared: UpdateConfigBody =
            serde_json::from_str(r#"{"telegramChatId": null}"#).unwrap();
        assert_eq!(cleared.telegram_chat_id, Some(None));

        let set: UpdateConfigBody =
            serde_json::from_str(r#"{"telegramChatId": "12345"}"#).unwrap();
        assert_eq!(set.telegram_chat_id, Some(Some("12345".to_string())));
    }
}
