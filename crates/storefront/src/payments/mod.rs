//! Payment gateway seam.
//!
//! Checkout only needs three things from a card processor: create an intent
//! for an exact amount, confirm it with the shopper's payment details, and
//! read back its status. [`StripeGateway`] talks to Stripe's REST API; tests
//! substitute a scripted implementation.

mod stripe;

pub use stripe::StripeGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sole_core::{CurrencyCode, PaymentStatus};

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed (connect, TLS, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    /// The gateway's response could not be parsed.
    #[error("unexpected gateway response: {0}")]
    Parse(String),

    /// Amounts must be positive integers in minor units.
    #[error("invalid amount: {0}")]
    InvalidAmount(i64),

    /// The client secret does not belong to a payment intent.
    #[error("malformed client secret")]
    MalformedSecret,
}

/// A freshly created payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentHandle {
    pub intent_id: String,
    pub client_secret: String,
}

/// The gateway's view of an intent after confirmation or lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentOutcome {
    pub intent_id: String,
    pub status: PaymentStatus,
    /// Human-readable reason when the payment did not go through.
    pub message: Option<String>,
}

/// What the shopper paid with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    /// Tokenized payment method, e.g. `pm_card_visa`.
    pub payment_method: String,
    /// Where the gateway sends the shopper after an off-site step such as 3-D Secure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
}

/// A card-payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an intent for `amount_minor` units of `currency`.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<IntentHandle, PaymentError>;

    /// Confirm the intent behind `client_secret`.
    ///
    /// A declined card is an `Ok` outcome with [`PaymentStatus::Failed`],
    /// not an error.
    async fn confirm(
        &self,
        client_secret: &str,
        details: &PaymentDetails,
    ) -> Result<IntentOutcome, PaymentError>;

    /// Current status of an intent.
    async fn retrieve(&self, intent_id: &str) -> Result<IntentOutcome, PaymentError>;
}

/// Intent id embedded in a client secret (`pi_123_secret_abc` -> `pi_123`).
///
/// # Errors
///
/// Returns `PaymentError::MalformedSecret` if the secret has no intent prefix.
pub fn intent_id_from_secret(client_secret: &str) -> Result<&str, PaymentError> {
    match client_secret.split_once("_secret_") {
        Some((id, rest)) if id.starts_with("pi_") && id.len() > 3 && !rest.is_empty() => Ok(id),
        _ => Err(PaymentError::MalformedSecret),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_id_from_secret() {
        assert_eq!(
            intent_id_from_secret("pi_3Mtw_secret_YrKJUKribcBjcG8HVhfZluoGH").unwrap(),
            "pi_3Mtw"
        );
        assert!(intent_id_from_secret("pi__secret_x").is_err());
        assert!(intent_id_from_secret("seti_123_secret_abc").is_err());
        assert!(intent_id_from_secret("pi_123").is_err());
    }
}
