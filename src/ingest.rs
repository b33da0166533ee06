//! Ingestion coordinator: the transactional heart of the pipeline.
//!
//! One call handles one telemetry submission end to end: validate, then
//! inside a single transaction ensure the device row, resolve its alert
//! configuration, classify the measurement, append the reading and record
//! any threshold-crossing alert, commit — and only then attempt the
//! Telegram dispatch. The dispatch is advisory: its failure is logged and
//! reflected solely in the alert row's delivery flag, never in the
//! response.

use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::error::IngestError;
use crate::models::{
    render_alert_message, AlertKind, LevelStatus, ResolvedConfig, WaterLevelPayload, WaterReading,
};
use crate::notify::Notifier;
use crate::store;
use crate::Config;

// ---

/// Success payload of one ingestion request, returned to the sensor
/// regardless of the notification outcome.
#[derive(Debug)]
pub struct IngestOutcome {
    // ---
    pub reading: WaterReading,
    pub device_name: String,
    pub config: ResolvedConfig,
}

/// An alert captured during the transactional phase for post-commit
/// dispatch. Only built when a notification target was resolvable.
struct PendingAlert {
    // ---
    alert_id: i64,
    text: String,
    chat_id: String,
}

/// Validate a telemetry payload before any transaction is opened.
///
/// Requires a non-empty `device_id`, and an exact `secret_key` match
/// whenever a shared secret is configured. Returns the device identifier.
fn validate<'a>(
    payload: &'a WaterLevelPayload,
    expected_secret: Option<&str>,
) -> Result<&'a str, IngestError> {
    // ---
    let device_id = match payload.device_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => return Err(IngestError::DeviceIdRequired),
    };

    if let Some(expected) = expected_secret {
        if payload.secret_key.as_deref() != Some(expected) {
            return Err(IngestError::InvalidSecretKey);
        }
    }

    Ok(device_id)
}

/// Process one telemetry submission.
///
/// On any storage failure the transaction is dropped, which rolls it back
/// in full; nothing persists and the error is surfaced to the caller. Once
/// the commit succeeds the outcome is fixed: dispatch failures only leave
/// the alert's `sent_to_telegram` flag false.
pub async fn ingest_reading(
    pool: &PgPool,
    config: &Config,
    notifier: &Notifier,
    payload: WaterLevelPayload,
) -> Result<IngestOutcome, IngestError> {
    // ---
    let device_id = validate(&payload, config.secret_key.as_deref())?;

    let mut tx = pool.begin().await?;

    let device_name = store::ensure_device(&mut tx, device_id).await?;
    let device_config = store::resolve_config(&mut tx, device_id).await?;

    let status = LevelStatus::classify(
        payload.water_level_percent,
        payload.status.as_deref(),
        device_config.min_level_percent,
        device_config.max_level_percent,
    );

    // Devices without a real-time clock omit the timestamp.
    let created_at = payload.timestamp.unwrap_or_else(Utc::now);

    let reading = store::append_reading(
        &mut tx,
        device_id,
        payload.water_level_cm,
        payload.water_level_percent,
        status.as_str(),
        created_at,
    )
    .await?;

    let mut pending: Option<PendingAlert> = None;

    if status.is_crossing() {
        let kind = match status {
            LevelStatus::Low => AlertKind::LowLevel,
            _ => AlertKind::HighLevel,
        };

        let text = render_alert_message(
            kind,
            &device_name,
            device_id,
            payload.water_level_percent,
            device_config.min_level_percent,
            device_config.max_level_percent,
        );

        let alert_id =
            store::record_alert(&mut tx, device_id, reading.id, kind, &text, created_at).await?;

        info!(
            device_id,
            alert_id,
            kind = kind.as_str(),
            "threshold crossing recorded"
        );

        // Device-specific chat id wins over the process-wide default.
        let target = device_config
            .telegram_chat_id
            .clone()
            .or_else(|| config.default_chat_id.clone());

        if let Some(chat_id) = target {
            pending = Some(PendingAlert {
                alert_id,
                text,
                chat_id,
            });
        }
    }

    tx.commit().await?;

    // The reading and alert are durable from here on. Dispatch is awaited
    // but advisory: a failure never reaches the caller.
    if let Some(alert) = pending {
        match notifier.send(&alert.chat_id, &alert.text).await {
            Ok(()) => {
                if let Err(e) = store::mark_alert_delivered(pool, alert.alert_id).await {
                    warn!(alert_id = alert.alert_id, "failed to mark alert delivered: {e}");
                }
            }
            Err(e) => {
                error!(
                    alert_id = alert.alert_id,
                    chat_id = %alert.chat_id,
                    "telegram dispatch failed: {e}"
                );
            }
        }
    }

    Ok(IngestOutcome {
        reading,
        device_name,
        config: device_config,
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn payload(device_id: Option<&str>, secret: Option<&str>) -> WaterLevelPayload {
        // ---
        WaterLevelPayload {
            device_id: device_id.map(String::from),
            secret_key: secret.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn missing_device_id_is_rejected() {
        // ---
        let err = validate(&payload(None, None), None).unwrap_err();
        assert!(matches!(err, IngestError::DeviceIdRequired));
    }

    #[test]
    fn empty_device_id_is_rejected() {
        // ---
        let err = validate(&payload(Some(""), None), None).unwrap_err();
        assert!(matches!(err, IngestError::DeviceIdRequired));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        // ---
        let err = validate(&payload(Some("D1"), Some("wrong")), Some("abc")).unwrap_err();
        assert!(matches!(err, IngestError::InvalidSecretKey));
    }

    #[test]
    fn absent_secret_is_rejected_when_one_is_configured() {
        // ---
        let err = validate(&payload(Some("D1"), None), Some("abc")).unwrap_err();
        assert!(matches!(err, IngestError::InvalidSecretKey));
    }

    #[test]
    fn matching_secret_passes() {
        // ---
        let p = payload(Some("D1"), Some("abc"));
        let id = validate(&p, Some("abc")).unwrap();
        assert_eq!(id, "D1");
    }

    #[test]
    fn secret_is_ignored_when_none_is_configured() {
        // ---
        let p = payload(Some("D1"), Some("anything"));
        let id = validate(&p, None).unwrap();
        assert_eq!(id, "D1");
    }
}
