//! Stripe payment intents over the REST API.
//!
//! Requests are form-encoded and authenticated with the secret key as the
//! basic-auth user.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::instrument;

use sole_core::{CurrencyCode, PaymentStatus};

use super::{
    IntentHandle, IntentOutcome, PaymentDetails, PaymentError, PaymentGateway,
    intent_id_from_secret,
};
use crate::config::StripeConfig;

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    status: String,
    last_payment_error: Option<StripeErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    payment_intent: Option<Box<StripeIntent>>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

impl From<StripeIntent> for IntentOutcome {
    fn from(intent: StripeIntent) -> Self {
        Self {
            status: PaymentStatus::from_gateway(&intent.status),
            message: intent.last_payment_error.and_then(|e| e.message),
            intent_id: intent.id,
        }
    }
}

/// Stripe-backed [`PaymentGateway`].
#[derive(Clone)]
pub struct StripeGateway {
    inner: Arc<StripeGatewayInner>,
}

struct StripeGatewayInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

impl StripeGateway {
    /// Create a new Stripe client.
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            inner: Arc::new(StripeGatewayInner {
                client: reqwest::Client::new(),
                api_base: config.api_base.clone(),
                secret_key: config.secret_key.clone(),
            }),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.inner.api_base)
    }

    async fn read_intent(response: reqwest::Response) -> Result<StripeIntent, PaymentError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| body.chars().take(200).collect());
            tracing::warn!(status = %status, message = %message, "Stripe API returned non-success status");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse Stripe payment intent"
            );
            PaymentError::Parse(e.to_string())
        })
    }
}

#[async_trait::async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
    ) -> Result<IntentHandle, PaymentError> {
        if amount_minor <= 0 {
            return Err(PaymentError::InvalidAmount(amount_minor));
        }

        let amount = amount_minor.to_string();
        let params = [
            ("amount", amount.as_str()),
            ("currency", currency.code()),
            ("automatic_payment_methods[enabled]", "true"),
        ];

        let response = self
            .inner
            .client
            .post(self.url("payment_intents"))
            .basic_auth(self.inner.secret_key.expose_secret(), Some(""))
            .form(&params)
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::Parse("payment intent without client secret".to_string()))?;

        tracing::info!(payment_intent_id = %intent.id, "Payment intent created");
        Ok(IntentHandle {
            intent_id: intent.id,
            client_secret,
        })
    }

    #[instrument(skip(self, client_secret, details))]
    async fn confirm(
        &self,
        client_secret: &str,
        details: &PaymentDetails,
    ) -> Result<IntentOutcome, PaymentError> {
        let intent_id = intent_id_from_secret(client_secret)?;

        let mut params = vec![
            ("client_secret", client_secret),
            ("payment_method", details.payment_method.as_str()),
        ];
        if let Some(return_url) = details.return_url.as_deref() {
            params.push(("return_url", return_url));
        }

        let response = self
            .inner
            .client
            .post(self.url(&format!("payment_intents/{intent_id}/confirm")))
            .basic_auth(self.inner.secret_key.expose_secret(), Some(""))
            .form(&params)
            .send()
            .await?;

        // Card declines come back as 402 with the updated intent attached.
        if response.status() == reqwest::StatusCode::PAYMENT_REQUIRED {
            let body = response.text().await?;
            let envelope: StripeErrorEnvelope =
                serde_json::from_str(&body).map_err(|e| PaymentError::Parse(e.to_string()))?;
            let message = envelope.error.message.clone();
            tracing::info!(
                payment_intent_id = intent_id,
                kind = envelope.error.kind.as_deref().unwrap_or("unknown"),
                "Payment declined"
            );
            return Ok(envelope.error.payment_intent.map_or_else(
                || IntentOutcome {
                    intent_id: intent_id.to_string(),
                    status: PaymentStatus::Failed,
                    message: message.clone(),
                },
                |intent| IntentOutcome {
                    message: message.clone(),
                    ..IntentOutcome::from(*intent)
                },
            ));
        }

        let intent = Self::read_intent(response).await?;
        Ok(intent.into())
    }

    #[instrument(skip(self))]
    async fn retrieve(&self, intent_id: &str) -> Result<IntentOutcome, PaymentError> {
        let response = self
            .inner
            .client
            .get(self.url(&format!("payment_intents/{intent_id}")))
            .basic_auth(self.inner.secret_key.expose_secret(), Some(""))
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        Ok(intent.into())
    }
}
