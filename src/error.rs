//! Domain error types for the ingestion path.
//!
//! The coordinator distinguishes validation failures (rejected before any
//! transaction is opened) from storage failures (transaction rolled back in
//! full) and from dispatch failures (logged, never surfaced to the caller).

use axum::http::StatusCode;
use thiserror::Error;

// ---

/// Failure of a single ingestion request.
#[derive(Debug, Error)]
pub enum IngestError {
    // ---
    /// The payload carried no device identifier. No transaction is opened.
    #[error("device_id is required")]
    DeviceIdRequired,

    /// A shared secret is configured and the payload's key did not match.
    /// No transaction is opened.
    #[error("secret key mismatch")]
    InvalidSecretKey,

    /// The transactional phase failed; everything was rolled back.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl IngestError {
    /// Stable error code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::DeviceIdRequired => "DEVICE_ID_REQUIRED",
            IngestError::InvalidSecretKey => "INVALID_SECRET_KEY",
            // Storage details stay in the logs, the caller gets a generic code.
            IngestError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status for the response envelope.
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::DeviceIdRequired => StatusCode::BAD_REQUEST,
            IngestError::InvalidSecretKey => StatusCode::FORBIDDEN,
            IngestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Failure of a notification dispatch attempt.
///
/// Dispatch runs after commit; none of these variants ever reach the
/// sensor's response or reverse persisted rows.
#[derive(Debug, Error)]
pub enum DispatchError {
    // ---
    /// `TELEGRAM_BOT_TOKEN` is not configured. A fatal configuration
    /// error, distinct from a transient network failure.
    #[error("TELEGRAM_BOT_TOKEN is not configured")]
    CredentialMissing,

    /// The Bot API answered with a non-success status (bad chat id,
    /// revoked token, ...).
    #[error("telegram API rejected the message: HTTP {0}")]
    Rejected(u16),

    /// The request never completed (DNS, TLS, timeout).
    #[error("telegram request failed: {0}")]
    Transport(#[from] reqwest::Error),
}
