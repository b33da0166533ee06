//! Transactional storage primitives for the ingestion path.
//!
//! Every function here that takes a [`Transaction`] runs inside the
//! coordinator's unit of work; nothing it writes is visible until the
//! coordinator commits. First-contact inserts for devices and configs use
//! `ON CONFLICT (device_id) DO NOTHING` and re-read on conflict, so two
//! concurrent requests for a never-seen device converge on one row instead
//! of one of them failing.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::{
    AlertKind, ResolvedConfig, WaterReading, DEFAULT_MAX_LEVEL_PERCENT, DEFAULT_MIN_LEVEL_PERCENT,
};

// ---

/// Look up a device by its external identifier, creating it with the
/// default name `Device <device_id>` and an empty location on first sight.
/// Returns the canonical display name.
pub async fn ensure_device(
    tx: &mut Transaction<'_, Postgres>,
    device_id: &str,
) -> Result<String, sqlx::Error> {
    // ---
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT name FROM devices WHERE device_id = $1")
            .bind(device_id)
            .fetch_optional(&mut **tx)
            .await?;

    if let Some((name,)) = existing {
        return Ok(name);
    }

    let inserted: Option<(String,)> = sqlx::query_as(
        r#"
        INSERT INTO devices (device_id, name, location)
        VALUES ($1, $2, $3)
        ON CONFLICT (device_id) DO NOTHING
        RETURNING name
        "#,
    )
    .bind(device_id)
    .bind(format!("Device {device_id}"))
    .bind("")
    .fetch_optional(&mut **tx)
    .await?;

    match inserted {
        Some((name,)) => Ok(name),
        // Lost the first-contact race: the row exists now, read the winner's.
        None => {
            let (name,): (String,) =
                sqlx::query_as("SELECT name FROM devices WHERE device_id = $1")
                    .bind(device_id)
                    .fetch_one(&mut **tx)
                    .await?;
            Ok(name)
        }
    }
}

/// Load the device's alert configuration, creating a default row on first
/// sight. Individually-null stored fields resolve to the system defaults;
/// the chat id stays unset unless explicitly configured.
pub async fn resolve_config(
    tx: &mut Transaction<'_, Postgres>,
    device_id: &str,
) -> Result<ResolvedConfig, sqlx::Error> {
    // ---
    type ConfigRow = (Option<f64>, Option<f64>, Option<bool>, Option<String>);

    let row: Option<ConfigRow> = sqlx::query_as(
        r#"
        SELECT min_level_percent, max_level_percent, alert_enabled, telegram_chat_id
        FROM alert_config WHERE device_id = $1
        "#,
    )
    .bind(device_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((min, max, enabled, chat_id)) = row {
        return Ok(ResolvedConfig::resolve(min, max, enabled, chat_id));
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO alert_config (device_id, min_level_percent, max_level_percent, alert_enabled)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (device_id) DO NOTHING
        "#,
    )
    .bind(device_id)
    .bind(DEFAULT_MIN_LEVEL_PERCENT)
    .bind(DEFAULT_MAX_LEVEL_PERCENT)
    .bind(true)
    .execute(&mut **tx)
    .await?;

    if inserted.rows_affected() == 1 {
        return Ok(ResolvedConfig::default());
    }

    // Lost the race; another request created the config first.
    let (min, max, enabled, chat_id): ConfigRow = sqlx::query_as(
        r#"
        SELECT min_level_percent, max_level_percent, alert_enabled, telegram_chat_id
        FROM alert_config WHERE device_id = $1
        "#,
    )
    .bind(device_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(ResolvedConfig::resolve(min, max, enabled, chat_id))
}

/// Append one immutable reading row and return it as stored.
pub async fn append_reading(
    tx: &mut Transaction<'_, Postgres>,
    device_id: &str,
    water_level_cm: Option<f64>,
    water_level_percent: Option<f64>,
    status: &str,
    created_at: DateTime<Utc>,
) -> Result<WaterReading, sqlx::Error> {
    // ---
    sqlx::query_as(
        r#"
        INSERT INTO water_readings
            (device_id, water_level_cm, water_level_percent, status, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, device_id, water_level_cm, water_level_percent, status, created_at
        "#,
    )
    .bind(device_id)
    .bind(water_level_cm)
    .bind(water_level_percent)
    .bind(status)
    .bind(created_at)
    .fetch_one(&mut **tx)
    .await
}

/// Record a threshold crossing linked to its triggering reading. The
/// delivery flag starts false; it is only flipped by
/// [`mark_alert_delivered`] after a confirmed dispatch.
pub async fn record_alert(
    tx: &mut Transaction<'_, Postgres>,
    device_id: &str,
    reading_id: i64,
    kind: AlertKind,
    message: &str,
    created_at: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    // ---
    let (alert_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO alerts
            (device_id, reading_id, alert_type, message, sent_to_telegram, created_at)
        VALUES ($1, $2, $3, $4, FALSE, $5)
        RETURNING id
        "#,
    )
    .bind(device_id)
    .bind(reading_id)
    .bind(kind.as_str())
    .bind(message)
    .bind(created_at)
    .fetch_one(&mut **tx)
    .await?;

    Ok(alert_id)
}

/// Flip the delivery flag after a confirmed dispatch. Runs on the pool,
/// outside any transaction: the alert row is already durable and this
/// update is best-effort.
pub async fn mark_alert_delivered(pool: &PgPool, alert_id: i64) -> Result<(), sqlx::Error> {
    // ---
    sqlx::query("UPDATE alerts SET sent_to_telegram = TRUE WHERE id = $1")
        .bind(alert_id)
        .execute(pool)
        .await?;

    Ok(())
}
