//! Data models for the water level pipeline: the inbound telemetry payload,
//! the stored rows, the threshold classifier, and alert message rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// System-wide fallback thresholds, applied when a device has no stored
/// configuration (or a stored field is null).
pub const DEFAULT_MIN_LEVEL_PERCENT: f64 = 20.0;
pub const DEFAULT_MAX_LEVEL_PERCENT: f64 = 90.0;

/// Raw telemetry payload posted by a field sensor.
///
/// Every field except `device_id` is optional: cheap sensors report only a
/// percentage, some report only a raw status string, and devices without a
/// real-time clock omit `timestamp` entirely.
#[derive(Debug, Default, Deserialize)]
pub struct WaterLevelPayload {
    // ---
    pub device_id: Option<String>,
    pub water_level_cm: Option<f64>,
    pub water_level_percent: Option<f64>,
    pub status: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub secret_key: Option<String>,
}

/// A stored, immutable water level reading.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WaterReading {
    // ---
    pub id: i64,
    pub device_id: String,
    pub water_level_cm: Option<f64>,
    pub water_level_percent: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A registered sensor device.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Device {
    // ---
    pub id: i64,
    pub device_id: String,
    pub name: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---

/// Classification of a reading against the device's threshold band.
///
/// `Reported` carries a raw status string from a device that sent no
/// percentage. A device reporting `LOW` or `HIGH` directly classifies as
/// that crossing; any other string is stored verbatim and never alerts.
#[derive(Debug, Clone, PartialEq)]
pub enum LevelStatus {
    Low,
    High,
    Normal,
    Reported(String),
    Unknown,
}

impl LevelStatus {
    /// Classify a measurement. Pure and total: a percentage beats the
    /// device-reported status, and with neither present the result is
    /// `Unknown`.
    pub fn classify(
        percent: Option<f64>,
        reported: Option<&str>,
        min_level: f64,
        max_level: f64,
    ) -> Self {
        // ---
        match percent {
            Some(p) if p < min_level => LevelStatus::Low,
            Some(p) if p > max_level => LevelStatus::High,
            Some(_) => LevelStatus::Normal,
            None => match reported {
                Some("LOW") => LevelStatus::Low,
                Some("HIGH") => LevelStatus::High,
                Some(s) => LevelStatus::Reported(s.to_string()),
                None => LevelStatus::Unknown,
            },
        }
    }

    /// A crossing status is one that should produce an alert.
    pub fn is_crossing(&self) -> bool {
        matches!(self, LevelStatus::Low | LevelStatus::High)
    }

    /// The string persisted in `water_readings.status`.
    pub fn as_str(&self) -> &str {
        match self {
            LevelStatus::Low => "LOW",
            LevelStatus::High => "HIGH",
            LevelStatus::Normal => "NORMAL",
            LevelStatus::Reported(s) => s,
            LevelStatus::Unknown => "UNKNOWN",
        }
    }
}

/// Severity of a threshold crossing, stored in `alerts.alert_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    LowLevel,
    HighLevel,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::LowLevel => "LOW_LEVEL",
            AlertKind::HighLevel => "HIGH_LEVEL",
        }
    }
}

/// Render the notification message for an alert.
///
/// The template is deterministic per kind: severity header, device name and
/// identifier, current percentage (or "unknown"), the configured band, and
/// a severity-specific action hint. Empty lines are dropped.
pub fn render_alert_message(
    kind: AlertKind,
    device_name: &str,
    device_id: &str,
    percent: Option<f64>,
    min_level: f64,
    max_level: f64,
) -> String {
    // ---
    let header = match kind {
        AlertKind::HighLevel => "🚨 HIGH WATER LEVEL ALERT 🚨",
        AlertKind::LowLevel => "⚠️ Low water level warning",
    };

    let level_text = match percent {
        Some(p) => format!("{p:.1}%"),
        None => "unknown".to_string(),
    };

    let action_hint = match kind {
        AlertKind::HighLevel => {
            "➡️ Check the surrounding area immediately, overflow or flooding is possible."
        }
        AlertKind::LowLevel => {
            "➡️ Check the water supply; the tank may need refilling or the pump may have failed."
        }
    };

    [
        header.to_string(),
        format!("📍 Device: {device_name} ({device_id})"),
        format!("💧 Current level: {level_text}"),
        format!("📊 Configured band: min = {min_level}% · max = {max_level}%"),
        action_hint.to_string(),
    ]
    .into_iter()
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join("\n")
}

// ---

/// Per-device alert configuration with every field resolved, defaults
/// substituted for anything unset. This is what the classifier and the
/// response envelope see; raw nullable rows never leave the store layer.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    // ---
    #[serde(rename = "minLevelPercent")]
    pub min_level_percent: f64,
    #[serde(rename = "maxLevelPercent")]
    pub max_level_percent: f64,
    #[serde(rename = "alertEnabled")]
    pub alert_enabled: bool,
    #[serde(rename = "deviceChatId")]
    pub telegram_chat_id: Option<String>,
}

impl ResolvedConfig {
    /// Substitute the system default for each individually-null field.
    /// The chat id has no default here; the coordinator falls back to the
    /// process-wide default target only when picking a dispatch target.
    pub fn resolve(
        min_level_percent: Option<f64>,
        max_level_percent: Option<f64>,
        alert_enabled: Option<bool>,
        telegram_chat_id: Option<String>,
    ) -> Self {
        // ---
        Self {
            min_level_percent: min_level_percent.unwrap_or(DEFAULT_MIN_LEVEL_PERCENT),
            max_level_percent: max_level_percent.unwrap_or(DEFAULT_MAX_LEVEL_PERCENT),
            alert_enabled: alert_enabled.unwrap_or(true),
            telegram_chat_id,
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::resolve(None, None, None, None)
    }
}
