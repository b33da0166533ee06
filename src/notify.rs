//! Telegram notification dispatcher.
//!
//! Delivery is best-effort and always runs after the ingestion transaction
//! has committed: a failure here is logged by the coordinator and never
//! surfaces in the client response or rolls anything back.

use serde_json::json;

use crate::error::DispatchError;

// ---

/// Thin client for the Telegram Bot API.
///
/// Cheap to clone (the inner [`reqwest::Client`] is reference-counted), so
/// one instance is built at startup and shared through router state.
#[derive(Debug, Clone)]
pub struct Notifier {
    // ---
    client: reqwest::Client,
    token: Option<String>,
    api_base: String,
}

impl Notifier {
    /// Build a dispatcher. A missing token is not an error here; it only
    /// fails the first actual send attempt with
    /// [`DispatchError::CredentialMissing`].
    pub fn new(token: Option<String>, api_base: String) -> Self {
        // ---
        Self {
            client: reqwest::Client::new(),
            token,
            api_base,
        }
    }

    /// Deliver `text` to the Telegram chat `chat_id`.
    ///
    /// Never retried by the caller; a single attempt either succeeds or
    /// reports a [`DispatchError`].
    pub async fn send(&self, chat_id: &str, text: &str) -> Result<(), DispatchError> {
        // ---
        let token = self.token.as_deref().ok_or(DispatchError::CredentialMissing)?;

        let url = format!("{}/bot{}/sendMessage", self.api_base, token);

        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DispatchError::Rejected(response.status().as_u16()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::error::DispatchError;

    #[tokio::test]
    async fn send_without_token_is_a_credential_error() {
        // ---
        let notifier = Notifier::new(None, "https://api.telegram.org".into());
        let err = notifier.send("12345", "hello").await.unwrap_err();
        assert!(matches!(err, DispatchError::CredentialMissing));
    }
}
