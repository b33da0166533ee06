// src/routes/iot.rs
//! Telemetry ingestion endpoint.
//!
//! `POST /api/iot/water-level` is the single write path used by field
//! sensors. The handler is a thin shim: it hands the payload to the
//! ingestion coordinator and translates the outcome into the response
//! envelope. All transactional and alerting behavior lives in
//! [`crate::ingest`].

use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router,
};
use serde::Serialize;
use tracing::{error, info};

use super::{AppState, Envelope};
use crate::error::IngestError;
use crate::ingest;
use crate::models::{ResolvedConfig, WaterLevelPayload, WaterReading};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/api/iot/water-level", post(handler))
}

/// Success payload for an accepted reading.
#[derive(Debug, Serialize)]
struct IngestResponse {
    // ---
    reading: WaterReading,
    device: DeviceSummary,
    config: ResolvedConfig,
}

#[derive(Debug, Serialize)]
struct DeviceSummary {
    // ---
    device_id: String,
    name: String,
}

async fn handler(
    State((pool, config, notifier)): State<AppState>,
    Json(payload): Json<WaterLevelPayload>,
) -> impl IntoResponse {
    // ---
    match ingest::ingest_reading(&pool, &config, &notifier, payload).await {
        Ok(outcome) => {
            info!(
                device_id = %outcome.reading.device_id,
                reading_id = outcome.reading.id,
                status = %outcome.reading.status,
                "reading stored"
            );

            let device_id = outcome.reading.device_id.clone();
            let body = IngestResponse {
                reading: outcome.reading,
                device: DeviceSummary {
                    device_id,
                    name: outcome.device_name,
                },
                config: outcome.config,
            };
            (StatusCode::OK, Json(Envelope::ok(body))).into_response()
        }
        Err(e) => {
            // Validation rejections are routine; storage failures are not.
            match &e {
                IngestError::Storage(cause) => error!("ingestion failed: {cause}"),
                other => info!("ingestion rejected: {other}"),
            }
            (e.status(), Json(Envelope::error(e.code()))).into_response()
        }
    }
}
