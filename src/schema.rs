//! Database schema management for `levelwatch`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `devices`, `alert_config`, `water_readings` and `alerts`
/// tables. Safe to call on every startup; no-op if objects already exist.
///
/// The `UNIQUE` constraints on `devices.device_id` and
/// `alert_config.device_id` back the lazy-creation path: two concurrent
/// first-contact requests cannot both insert, the loser re-reads.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Registered sensor devices, created lazily on first contact.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id         BIGSERIAL PRIMARY KEY,
            device_id  TEXT        NOT NULL UNIQUE,
            name       TEXT        NOT NULL,
            location   TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Per-device threshold configuration. Nullable fields mean "use the
    // system default"; resolution happens in the store layer.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alert_config (
            id                BIGSERIAL PRIMARY KEY,
            device_id         TEXT        NOT NULL UNIQUE,
            min_level_percent DOUBLE PRECISION,
            max_level_percent DOUBLE PRECISION,
            alert_enabled     BOOLEAN,
            telegram_chat_id  TEXT,
            updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Immutable measurement history, served by the dashboard endpoints.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS water_readings (
            id                  BIGSERIAL PRIMARY KEY,
            device_id           TEXT        NOT NULL,
            water_level_cm      DOUBLE PRECISION,
            water_level_percent DOUBLE PRECISION,
            status              TEXT        NOT NULL,
            created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Threshold crossings, each linked to the reading that triggered it.
    // `sent_to_telegram` flips to true only after a confirmed dispatch.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alerts (
            id               BIGSERIAL PRIMARY KEY,
            device_id        TEXT        NOT NULL,
            reading_id       BIGINT      NOT NULL REFERENCES water_readings (id),
            alert_type       TEXT        NOT NULL,
            message          TEXT        NOT NULL,
            sent_to_telegram BOOLEAN     NOT NULL DEFAULT FALSE,
            created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_water_readings_device_created
            ON water_readings (device_id, created_at DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_alerts_device_id
            ON alerts (device_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
