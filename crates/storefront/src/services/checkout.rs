//! Checkout orchestration.
//!
//! Drives a shopper's [`CheckoutContext`] through
//! `AwaitingProfile -> AwaitingIntent -> AwaitingPayment -> Settling -> Completed`:
//!
//! 1. The profile gate needs first name, last name and date of birth.
//!    Whatever fields are submitted are written through before the gate is
//!    re-checked.
//! 2. With a complete profile and a non-empty cart, the cart is priced and a
//!    payment intent is created for the exact total in minor units.
//! 3. Only a `succeeded` status from the gateway moves the checkout on to
//!    settlement. Anything else leaves it waiting for payment.
//! 4. Settlement records one order per payment intent with a conditional
//!    insert, then clears the cart. A ledger failure after the money moved
//!    is a reconciliation error, never a payment failure.
//!
//! Every gateway call is bounded by the configured timeout; a timeout is
//! reported as the gateway being unavailable.

use std::future::Future;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Utc};
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use sole_core::order_number::{SUFFIX_MAX, SUFFIX_MIN};
use sole_core::pricing::Totals;
use sole_core::profile::{ProfileDetails, ProfileField, age_on};
use sole_core::{CurrencyCode, OrderNumber, OrderStatus, PaymentStatus, UserId};

use crate::config::CheckoutConfig;
use crate::db::{IdentityStore, InsertOutcome, OrderLedger, RepositoryError};
use crate::models::user::ProfileUpdate;
use crate::models::{CheckoutContext, CheckoutState, HeldIntent, NewOrder, Order, OrderItem, User};
use crate::payments::{PaymentDetails, PaymentError, PaymentGateway};

/// Fresh order numbers tried before settlement gives up.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Source of the four-digit order number suffix.
pub type SuffixSource = Arc<dyn Fn() -> u16 + Send + Sync>;

/// Errors that can occur during checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Missing profile fields, empty cart, or a step taken out of order.
    /// The checkout stays where it was.
    #[error("{message}")]
    Validation {
        message: String,
        missing: Vec<ProfileField>,
    },

    /// The gateway could not be reached, errored, or timed out.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway answered, but the payment did not succeed.
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// The payment succeeded but no order could be recorded for it.
    #[error("payment {payment_intent_id} succeeded but the order could not be recorded: {reason}")]
    Reconciliation {
        payment_intent_id: String,
        reason: String,
    },

    /// Unknown payment intent or order.
    #[error("not found: {0}")]
    NotFound(String),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            missing: Vec::new(),
        }
    }
}

/// Payment intent details the client needs to collect payment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub intent_id: String,
    pub client_secret: String,
    pub amount_minor: i64,
    pub currency: CurrencyCode,
}

/// Where a shopper's checkout stands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutView {
    pub state: &'static str,
    /// Profile fields still needed before payment.
    pub missing: Vec<ProfileField>,
    /// Stored profile, with first/last name prefilled from the display name.
    pub profile: ProfileDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(flatten)]
    pub totals: Totals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<OrderNumber>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
}

/// The checkout state machine.
#[derive(Clone)]
pub struct CheckoutService {
    users: Arc<dyn IdentityStore>,
    orders: Arc<dyn OrderLedger>,
    gateway: Arc<dyn PaymentGateway>,
    settings: CheckoutConfig,
    suffixes: SuffixSource,
}

impl CheckoutService {
    /// Create a checkout service with random order number suffixes.
    #[must_use]
    pub fn new(
        users: Arc<dyn IdentityStore>,
        orders: Arc<dyn OrderLedger>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutConfig,
    ) -> Self {
        Self {
            users,
            orders,
            gateway,
            settings,
            suffixes: Arc::new(|| rand::rng().random_range(SUFFIX_MIN..=SUFFIX_MAX)),
        }
    }

    /// Replace the order number suffix source.
    #[must_use]
    pub fn with_suffixes(mut self, suffixes: SuffixSource) -> Self {
        self.suffixes = suffixes;
        self
    }

    /// Checkout settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &CheckoutConfig {
        &self.settings
    }

    /// Current checkout state, after re-checking the profile gate.
    ///
    /// # Errors
    ///
    /// Propagates identity store failures.
    pub async fn view(
        &self,
        user_id: UserId,
        ctx: &mut CheckoutContext,
    ) -> Result<CheckoutView, CheckoutError> {
        let user = self.load_user(user_id).await?;
        refresh_gate(ctx, &user.profile());
        Ok(self.build_view(&user, ctx))
    }

    /// Write through the submitted profile fields, then re-check the gate.
    ///
    /// Blank fields are ignored. Age is derived from the date of birth.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` for a date of birth in the future.
    #[instrument(skip(self, ctx, input), fields(user_id = %user_id))]
    pub async fn submit_profile(
        &self,
        user_id: UserId,
        ctx: &mut CheckoutContext,
        input: &ProfileDetails,
    ) -> Result<CheckoutView, CheckoutError> {
        let today = Utc::now().date_naive();
        let patch = profile_patch(input, today)?;

        if patch.first_name.is_some() || patch.last_name.is_some() || patch.dob.is_some() {
            self.users.patch_profile(user_id, &patch).await?;
        }

        let view = self.view(user_id, ctx).await?;
        tracing::info!(state = view.state, missing = view.missing.len(), "Profile submitted");
        Ok(view)
    }

    /// Create (or reuse) a payment intent for the priced cart.
    ///
    /// An existing intent is reused when the cart and amount are unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Validation` with the missing fields while the
    /// profile is incomplete, or when the cart is empty. Returns
    /// `CheckoutError::GatewayUnavailable` if the intent could not be created;
    /// the checkout stays in `AwaitingIntent` so the request can be retried.
    #[instrument(skip(self, ctx), fields(user_id = %user_id))]
    pub async fn request_intent(
        &self,
        user_id: UserId,
        ctx: &mut CheckoutContext,
    ) -> Result<CheckoutView, CheckoutError> {
        let user = self.load_user(user_id).await?;

        match ctx.state {
            CheckoutState::Settling { .. } => {
                return Err(CheckoutError::validation(
                    "a payment for this checkout is still being recorded",
                ));
            }
            CheckoutState::Completed { .. } | CheckoutState::Abandoned { .. } => {
                ctx.state = CheckoutState::AwaitingProfile;
            }
            _ => {}
        }

        let profile = user.profile();
        refresh_gate(ctx, &profile);
        let missing = profile.missing();
        if !missing.is_empty() {
            return Err(CheckoutError::Validation {
                message: "profile is incomplete".to_string(),
                missing,
            });
        }
        if ctx.cart.is_empty() {
            return Err(CheckoutError::validation("cart is empty"));
        }

        let currency = self.settings.currency;
        let totals = ctx.cart.totals(self.settings.tax_rate);
        let amount_minor = totals
            .total_minor_units(currency)
            .filter(|amount| *amount > 0)
            .ok_or_else(|| CheckoutError::validation("order total must be positive"))?;

        if let CheckoutState::AwaitingPayment { intent } = &ctx.state
            && intent.amount_minor == amount_minor
            && intent.currency == currency
            && intent.lines == ctx.cart.lines()
        {
            tracing::debug!(payment_intent_id = %intent.intent_id, "Reusing payment intent");
            return Ok(self.build_view(&user, ctx));
        }

        ctx.state = CheckoutState::AwaitingIntent;
        let handle = self
            .call_gateway(
                "create_intent",
                self.gateway.create_intent(amount_minor, currency),
            )
            .await?;

        tracing::info!(
            payment_intent_id = %handle.intent_id,
            amount_minor,
            currency = %currency,
            "Awaiting payment"
        );
        ctx.state = CheckoutState::AwaitingPayment {
            intent: HeldIntent {
                intent_id: handle.intent_id,
                client_secret: handle.client_secret,
                amount_minor,
                currency,
                lines: ctx.cart.lines().to_vec(),
                totals,
            },
        };
        Ok(self.build_view(&user, ctx))
    }

    /// Confirm the held intent with the shopper's payment details and, on
    /// success, record the order.
    ///
    /// Confirming an already completed checkout returns its recorded order.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::PaymentFailed` with the gateway's message when
    /// the payment did not succeed, `CheckoutError::GatewayUnavailable` when
    /// the gateway could not answer, and `CheckoutError::Reconciliation` when
    /// the payment succeeded but the order could not be recorded.
    #[instrument(skip(self, ctx, details), fields(user_id = %user_id))]
    pub async fn confirm(
        &self,
        user_id: UserId,
        ctx: &mut CheckoutContext,
        details: &PaymentDetails,
    ) -> Result<Order, CheckoutError> {
        let intent = match &ctx.state {
            CheckoutState::AwaitingPayment { intent } => intent.clone(),
            CheckoutState::Settling { intent } => {
                let intent = intent.clone();
                return self.settle(user_id, ctx, intent, true).await;
            }
            CheckoutState::Completed {
                payment_intent_id, ..
            } => {
                let payment_intent_id = payment_intent_id.clone();
                return self.recorded_order(user_id, &payment_intent_id).await;
            }
            _ => return Err(CheckoutError::validation("no payment is pending")),
        };

        let outcome = self
            .call_gateway(
                "confirm",
                self.gateway.confirm(&intent.client_secret, details),
            )
            .await?;

        if outcome.intent_id != intent.intent_id {
            tracing::error!(
                expected = %intent.intent_id,
                actual = %outcome.intent_id,
                "Gateway confirmed a different payment intent"
            );
            return Err(CheckoutError::GatewayUnavailable(
                "gateway confirmed a different payment intent".to_string(),
            ));
        }

        if outcome.status != PaymentStatus::Succeeded {
            let message = outcome
                .message
                .unwrap_or_else(|| format!("payment was not completed ({})", outcome.status));
            tracing::info!(payment_intent_id = %intent.intent_id, %message, "Payment not completed");
            return Err(CheckoutError::PaymentFailed(message));
        }

        self.settle(user_id, ctx, intent, true).await
    }

    /// Finish a checkout the shopper returned to after paying off-site.
    ///
    /// Looks up the intent's status with the gateway and settles it if it
    /// succeeded. Safe to call any number of times for the same intent.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::NotFound` for an intent this checkout never
    /// held, otherwise as [`Self::confirm`].
    #[instrument(skip(self, ctx), fields(user_id = %user_id))]
    pub async fn complete(
        &self,
        user_id: UserId,
        ctx: &mut CheckoutContext,
        payment_intent_id: &str,
    ) -> Result<Order, CheckoutError> {
        if let Some(order) = self.orders.find_by_payment_intent(payment_intent_id).await? {
            if order.user_id != user_id {
                return Err(CheckoutError::NotFound("payment intent".to_string()));
            }
            // Another intent may be pending by now; only the checkout that
            // held this one moves on.
            if ctx.state.intent_for(payment_intent_id).is_some() {
                let clear_cart = ctx.state.held_intent().is_some();
                mark_completed(ctx, &order, clear_cart);
            }
            return Ok(order);
        }

        let intent = ctx
            .state
            .intent_for(payment_intent_id)
            .cloned()
            .ok_or_else(|| CheckoutError::NotFound("payment intent".to_string()))?;
        // An abandoned intent was priced for an older cart; leave the current one alone.
        let clear_cart = ctx.state.held_intent().is_some();

        if !matches!(ctx.state, CheckoutState::Settling { .. }) {
            let outcome = self
                .call_gateway("retrieve", self.gateway.retrieve(payment_intent_id))
                .await?;
            if outcome.status != PaymentStatus::Succeeded {
                return Err(CheckoutError::PaymentFailed(outcome.message.unwrap_or_else(
                    || format!("payment was not completed ({})", outcome.status),
                )));
            }
        }

        self.settle(user_id, ctx, intent, clear_cart).await
    }

    /// Record the order for a succeeded intent and complete the checkout.
    async fn settle(
        &self,
        user_id: UserId,
        ctx: &mut CheckoutContext,
        intent: HeldIntent,
        clear_cart: bool,
    ) -> Result<Order, CheckoutError> {
        if clear_cart {
            ctx.state = CheckoutState::Settling {
                intent: intent.clone(),
            };
        }

        let items: Vec<OrderItem> = intent.lines.iter().map(OrderItem::from).collect();
        let mut last_conflict = String::new();

        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let new_order = NewOrder {
                user_id,
                items: items.clone(),
                totals: intent.totals,
                order_number: self.next_order_number(),
                status: OrderStatus::Paid,
                payment_intent_id: Some(intent.intent_id.clone()),
            };

            match self.orders.insert_if_absent(&new_order).await {
                Ok(InsertOutcome::Inserted(order)) => {
                    tracing::info!(
                        payment_intent_id = %intent.intent_id,
                        order_number = %order.order_number,
                        "Order recorded"
                    );
                    mark_completed(ctx, &order, clear_cart);
                    return Ok(order);
                }
                Ok(InsertOutcome::Existing(order)) => {
                    tracing::info!(
                        payment_intent_id = %intent.intent_id,
                        order_number = %order.order_number,
                        "Order already recorded for payment intent"
                    );
                    mark_completed(ctx, &order, clear_cart);
                    return Ok(order);
                }
                Err(RepositoryError::Conflict(reason)) => {
                    tracing::warn!(
                        order_number = %new_order.order_number,
                        "Order number taken, generating another"
                    );
                    last_conflict = reason;
                }
                Err(e) => return Err(reconciliation(user_id, &intent, &e.to_string())),
            }
        }

        Err(reconciliation(user_id, &intent, &last_conflict))
    }

    async fn recorded_order(
        &self,
        user_id: UserId,
        payment_intent_id: &str,
    ) -> Result<Order, CheckoutError> {
        self.orders
            .find_by_payment_intent(payment_intent_id)
            .await?
            .filter(|order| order.user_id == user_id)
            .ok_or_else(|| CheckoutError::NotFound("order".to_string()))
    }

    async fn load_user(&self, user_id: UserId) -> Result<User, CheckoutError> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| CheckoutError::NotFound("user".to_string()))
    }

    async fn call_gateway<T, F>(&self, operation: &'static str, call: F) -> Result<T, CheckoutError>
    where
        F: Future<Output = Result<T, PaymentError>> + Send,
    {
        match tokio::time::timeout(self.settings.payment_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(operation, error = %e, "Payment gateway call failed");
                Err(CheckoutError::GatewayUnavailable(e.to_string()))
            }
            Err(_) => {
                tracing::warn!(
                    operation,
                    timeout_secs = self.settings.payment_timeout.as_secs(),
                    "Payment gateway call timed out"
                );
                Err(CheckoutError::GatewayUnavailable(format!(
                    "{operation} timed out"
                )))
            }
        }
    }

    fn next_order_number(&self) -> OrderNumber {
        OrderNumber::new(
            &self.settings.region_code,
            Utc::now().year(),
            (self.suffixes)(),
        )
    }

    fn build_view(&self, user: &User, ctx: &CheckoutContext) -> CheckoutView {
        let profile = user.profile_with_suggestions();
        let missing = user.profile().missing();

        let (totals, payment, order_number, payment_intent_id) = match &ctx.state {
            CheckoutState::AwaitingPayment { intent } | CheckoutState::Settling { intent } => (
                intent.totals,
                Some(PaymentView {
                    intent_id: intent.intent_id.clone(),
                    client_secret: intent.client_secret.clone(),
                    amount_minor: intent.amount_minor,
                    currency: intent.currency,
                }),
                None,
                Some(intent.intent_id.clone()),
            ),
            CheckoutState::Completed {
                order_number,
                payment_intent_id,
                ..
            } => (
                ctx.cart.totals(self.settings.tax_rate),
                None,
                Some(order_number.clone()),
                Some(payment_intent_id.clone()),
            ),
            _ => (ctx.cart.totals(self.settings.tax_rate), None, None, None),
        };

        CheckoutView {
            state: ctx.state.name(),
            missing,
            profile,
            age: user.age,
            totals,
            payment,
            order_number,
            payment_intent_id,
        }
    }
}

/// Move between the two pre-payment states to match the profile.
fn refresh_gate(ctx: &mut CheckoutContext, profile: &ProfileDetails) {
    if matches!(
        ctx.state,
        CheckoutState::AwaitingProfile | CheckoutState::AwaitingIntent
    ) {
        ctx.state = if profile.is_complete() {
            CheckoutState::AwaitingIntent
        } else {
            CheckoutState::AwaitingProfile
        };
    }
}

fn mark_completed(ctx: &mut CheckoutContext, order: &Order, clear_cart: bool) {
    if clear_cart {
        ctx.cart.clear();
    }
    if let Some(payment_intent_id) = &order.payment_intent_id {
        ctx.state = CheckoutState::Completed {
            order_id: order.id,
            order_number: order.order_number.clone(),
            payment_intent_id: payment_intent_id.clone(),
        };
    }
}

/// Non-blank submitted fields as a partial update, with age derived from `dob`.
fn profile_patch(input: &ProfileDetails, today: NaiveDate) -> Result<ProfileUpdate, CheckoutError> {
    if input.dob.is_some_and(|dob| dob > today) {
        return Err(CheckoutError::Validation {
            message: "date of birth cannot be in the future".to_string(),
            missing: vec![ProfileField::DateOfBirth],
        });
    }

    let trimmed = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToOwned::to_owned)
    };

    Ok(ProfileUpdate {
        first_name: trimmed(&input.first_name),
        last_name: trimmed(&input.last_name),
        dob: input.dob,
        age: input.dob.map(|dob| age_on(dob, today)),
    })
}

fn reconciliation(user_id: UserId, intent: &HeldIntent, reason: &str) -> CheckoutError {
    tracing::error!(
        payment_intent_id = %intent.intent_id,
        user_id = %user_id,
        amount_minor = intent.amount_minor,
        reason,
        "Payment succeeded but the order could not be recorded"
    );
    sentry::with_scope(
        |scope| {
            scope.set_tag("reconciliation", "true");
            scope.set_tag("payment_intent_id", &intent.intent_id);
            scope.set_extra("amount_minor", intent.amount_minor.into());
        },
        || {
            sentry::capture_message(
                "Payment succeeded but the order could not be recorded",
                sentry::Level::Fatal,
            )
        },
    );

    CheckoutError::Reconciliation {
        payment_intent_id: intent.intent_id.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use sole_core::{Email, ProductId};

    use super::*;
    use crate::db::MemoryIdentity;
    use crate::db::MemoryOrderLedger;
    use crate::payments::{IntentHandle, IntentOutcome, intent_id_from_secret};

    /// Gateway whose answers are set by the test.
    #[derive(Default)]
    struct ScriptedGateway {
        created: Mutex<Vec<i64>>,
        unavailable: Mutex<bool>,
        status: Mutex<PaymentStatus>,
        hang: bool,
    }

    impl ScriptedGateway {
        fn succeeding() -> Self {
            let gateway = Self::default();
            *gateway.status.lock().unwrap() = PaymentStatus::Succeeded;
            gateway
        }

        fn outcome(&self, intent_id: &str) -> IntentOutcome {
            let status = *self.status.lock().unwrap();
            IntentOutcome {
                intent_id: intent_id.to_string(),
                status,
                message: (status != PaymentStatus::Succeeded)
                    .then(|| "Your card was declined.".to_string()),
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for ScriptedGateway {
        async fn create_intent(
            &self,
            amount_minor: i64,
            _currency: CurrencyCode,
        ) -> Result<IntentHandle, PaymentError> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if *self.unavailable.lock().unwrap() {
                return Err(PaymentError::Api {
                    status: 503,
                    message: "service unavailable".to_string(),
                });
            }
            let mut created = self.created.lock().unwrap();
            created.push(amount_minor);
            let intent_id = format!("pi_{}", created.len());
            Ok(IntentHandle {
                client_secret: format!("{intent_id}_secret_test"),
                intent_id,
            })
        }

        async fn confirm(
            &self,
            client_secret: &str,
            _details: &PaymentDetails,
        ) -> Result<IntentOutcome, PaymentError> {
            Ok(self.outcome(intent_id_from_secret(client_secret)?))
        }

        async fn retrieve(&self, intent_id: &str) -> Result<IntentOutcome, PaymentError> {
            Ok(self.outcome(intent_id))
        }
    }

    /// Ledger that is down.
    struct FailingLedger;

    #[async_trait]
    impl OrderLedger for FailingLedger {
        async fn insert(&self, _order: &NewOrder) -> Result<Order, RepositoryError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }

        async fn insert_if_absent(
            &self,
            _order: &NewOrder,
        ) -> Result<InsertOutcome, RepositoryError> {
            Err(sqlx::Error::PoolTimedOut.into())
        }

        async fn find_by_payment_intent(
            &self,
            _payment_intent_id: &str,
        ) -> Result<Option<Order>, RepositoryError> {
            Ok(None)
        }

        async fn list_by_user(&self, _user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        checkout: CheckoutService,
        users: Arc<MemoryIdentity>,
        ledger: Arc<MemoryOrderLedger>,
        gateway: Arc<ScriptedGateway>,
        user_id: UserId,
    }

    async fn harness_with(gateway: ScriptedGateway, profile_complete: bool) -> Harness {
        let users = Arc::new(MemoryIdentity::new());
        let user_id = users
            .create_user(&Email::parse("ada@example.com").unwrap(), "hash", Some("Ada Lovelace"))
            .await
            .unwrap();
        if profile_complete {
            users
                .patch_profile(
                    user_id,
                    &ProfileUpdate {
                        first_name: Some("Ada".to_string()),
                        last_name: Some("Lovelace".to_string()),
                        dob: NaiveDate::from_ymd_opt(1990, 12, 10),
                        age: Some(33),
                    },
                )
                .await
                .unwrap();
        }

        let ledger = Arc::new(MemoryOrderLedger::new());
        let gateway = Arc::new(gateway);
        let checkout = CheckoutService::new(
            Arc::clone(&users) as Arc<dyn IdentityStore>,
            Arc::clone(&ledger) as Arc<dyn OrderLedger>,
            Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
            CheckoutConfig::default(),
        );

        Harness {
            checkout,
            users,
            ledger,
            gateway,
            user_id,
        }
    }

    async fn harness() -> Harness {
        harness_with(ScriptedGateway::succeeding(), true).await
    }

    fn cart_with(price: &str, quantity: u32) -> CheckoutContext {
        let mut ctx = CheckoutContext::default();
        ctx.cart
            .add(
                ProductId::new(4),
                "9".parse().unwrap(),
                "Nike Dunk Low",
                price.parse().unwrap(),
                quantity,
            )
            .unwrap();
        ctx
    }

    fn card() -> PaymentDetails {
        PaymentDetails {
            payment_method: "pm_card_visa".to_string(),
            return_url: None,
        }
    }

    #[tokio::test]
    async fn test_missing_dob_blocks_payment_intent() {
        let h = harness_with(ScriptedGateway::succeeding(), false).await;
        h.users
            .patch_profile(
                h.user_id,
                &ProfileUpdate {
                    first_name: Some("Ada".to_string()),
                    last_name: Some("Lovelace".to_string()),
                    dob: None,
                    age: None,
                },
            )
            .await
            .unwrap();
        let mut ctx = cart_with("100", 1);

        let err = h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap_err();

        match err {
            CheckoutError::Validation { missing, .. } => {
                assert_eq!(missing, vec![ProfileField::DateOfBirth]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(ctx.state, CheckoutState::AwaitingProfile);
        assert!(h.gateway.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_profile_is_written_through() {
        let h = harness_with(ScriptedGateway::succeeding(), false).await;
        let mut ctx = cart_with("100", 1);

        let view = h
            .checkout
            .submit_profile(
                h.user_id,
                &mut ctx,
                &ProfileDetails {
                    first_name: Some(" Ada ".to_string()),
                    last_name: Some(String::new()),
                    dob: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(view.state, "awaiting_profile");
        assert_eq!(view.missing, vec![ProfileField::LastName, ProfileField::DateOfBirth]);
        // Last name is suggested from the display name but not stored.
        assert_eq!(view.profile.last_name.as_deref(), Some("Lovelace"));

        let stored = h.users.get_user(h.user_id).await.unwrap().unwrap();
        assert_eq!(stored.first_name.as_deref(), Some("Ada"));
        assert_eq!(stored.last_name, None);

        let view = h
            .checkout
            .submit_profile(
                h.user_id,
                &mut ctx,
                &ProfileDetails {
                    first_name: None,
                    last_name: Some("Lovelace".to_string()),
                    dob: NaiveDate::from_ymd_opt(2000, 6, 15),
                },
            )
            .await
            .unwrap();
        assert_eq!(view.state, "awaiting_intent");
        assert!(view.missing.is_empty());

        let stored = h.users.get_user(h.user_id).await.unwrap().unwrap();
        assert_eq!(stored.first_name.as_deref(), Some("Ada"));
        assert!(stored.age.is_some());
    }

    #[test]
    fn test_profile_patch_derives_age() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let patch = profile_patch(
            &ProfileDetails {
                first_name: None,
                last_name: None,
                dob: NaiveDate::from_ymd_opt(2000, 6, 15),
            },
            today,
        )
        .unwrap();
        assert_eq!(patch.age, Some(23));

        let future = ProfileDetails {
            dob: NaiveDate::from_ymd_opt(2030, 1, 1),
            ..ProfileDetails::default()
        };
        assert!(matches!(
            profile_patch(&future, today),
            Err(CheckoutError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_pay_and_record_order() {
        let h = harness().await;
        let mut ctx = cart_with("100", 1);

        let view = h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();
        assert_eq!(view.state, "awaiting_payment");
        let payment = view.payment.unwrap();
        assert_eq!(payment.amount_minor, 11_300);
        assert_eq!(*h.gateway.created.lock().unwrap(), vec![11_300]);

        let order = h.checkout.confirm(h.user_id, &mut ctx, &card()).await.unwrap();
        assert_eq!(order.subtotal, "100".parse().unwrap());
        assert_eq!(order.vat, "13".parse().unwrap());
        assert_eq!(order.total, "113".parse().unwrap());
        assert_eq!(order.status, OrderStatus::Paid);
        assert_eq!(order.payment_intent_id.as_deref(), Some(payment.intent_id.as_str()));
        assert!(order.order_number.as_str().starts_with("ORD-NP-"));
        assert!(order.totals_consistent(CheckoutConfig::default().tax_rate));

        assert!(ctx.cart.is_empty());
        assert_eq!(ctx.state.name(), "completed");
        assert_eq!(h.ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_unchanged_cart_reuses_intent() {
        let h = harness().await;
        let mut ctx = cart_with("120", 2);

        let first = h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();
        let second = h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();

        assert_eq!(
            first.payment.unwrap().intent_id,
            second.payment.unwrap().intent_id
        );
        assert_eq!(h.gateway.created.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_down_stays_awaiting_intent() {
        let h = harness().await;
        *h.gateway.unavailable.lock().unwrap() = true;
        let mut ctx = cart_with("100", 1);

        let err = h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap_err();
        assert!(matches!(err, CheckoutError::GatewayUnavailable(_)));
        assert_eq!(ctx.state, CheckoutState::AwaitingIntent);

        *h.gateway.unavailable.lock().unwrap() = false;
        let view = h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();
        assert_eq!(view.state, "awaiting_payment");
    }

    #[tokio::test(start_paused = true)]
    async fn test_gateway_timeout_is_unavailable() {
        let gateway = ScriptedGateway {
            hang: true,
            ..ScriptedGateway::default()
        };
        let h = harness_with(gateway, true).await;
        let mut ctx = cart_with("100", 1);

        let err = h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap_err();
        match err {
            CheckoutError::GatewayUnavailable(message) => assert!(message.contains("timed out")),
            other => panic!("expected gateway unavailable, got {other:?}"),
        }
        assert_eq!(ctx.state, CheckoutState::AwaitingIntent);
    }

    #[tokio::test]
    async fn test_declined_payment_keeps_awaiting_payment() {
        let h = harness_with(ScriptedGateway::default(), true).await;
        *h.gateway.status.lock().unwrap() = PaymentStatus::Failed;
        let mut ctx = cart_with("100", 1);
        h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();

        let err = h.checkout.confirm(h.user_id, &mut ctx, &card()).await.unwrap_err();
        match err {
            CheckoutError::PaymentFailed(message) => assert_eq!(message, "Your card was declined."),
            other => panic!("expected payment failure, got {other:?}"),
        }
        assert_eq!(ctx.state.name(), "awaiting_payment");
        assert!(!ctx.cart.is_empty());
        assert!(h.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_confirmation_records_one_order() {
        let h = harness().await;
        let mut ctx = cart_with("100", 1);
        h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();
        let mut reloaded_tab = ctx.clone();

        let first = h.checkout.confirm(h.user_id, &mut ctx, &card()).await.unwrap();
        let second = h.checkout.confirm(h.user_id, &mut ctx, &card()).await.unwrap();
        let third = h
            .checkout
            .complete(h.user_id, &mut reloaded_tab, "pi_1")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
        assert_eq!(h.ledger.len().await, 1);
        assert_eq!(
            h.ledger.list_by_user(h.user_id).await.unwrap()[0].payment_intent_id.as_deref(),
            Some("pi_1")
        );
    }

    #[tokio::test]
    async fn test_concurrent_settlement_records_one_order() {
        let h = harness().await;
        let mut ctx = cart_with("100", 1);
        h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();
        let mut other_tab = ctx.clone();
        let details = card();

        let (a, b) = tokio::join!(
            h.checkout.confirm(h.user_id, &mut ctx, &details),
            h.checkout.complete(h.user_id, &mut other_tab, "pi_1"),
        );

        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(h.ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_ledger_failure_after_payment_is_reconciliation() {
        let h = harness().await;
        let checkout = CheckoutService::new(
            Arc::clone(&h.users) as Arc<dyn IdentityStore>,
            Arc::new(FailingLedger),
            Arc::clone(&h.gateway) as Arc<dyn PaymentGateway>,
            CheckoutConfig::default(),
        );
        let mut ctx = cart_with("100", 1);
        checkout.request_intent(h.user_id, &mut ctx).await.unwrap();

        let err = checkout.confirm(h.user_id, &mut ctx, &card()).await.unwrap_err();

        match err {
            CheckoutError::Reconciliation {
                payment_intent_id, ..
            } => assert_eq!(payment_intent_id, "pi_1"),
            other => panic!("expected reconciliation error, got {other:?}"),
        }
        assert_eq!(ctx.state.name(), "settling");
        assert!(!ctx.cart.is_empty());
    }

    #[tokio::test]
    async fn test_order_number_collision_is_regenerated() {
        let h = harness().await;
        let year = Utc::now().year();
        h.ledger
            .insert(&NewOrder {
                user_id: h.user_id,
                items: Vec::new(),
                totals: Totals::ZERO,
                order_number: OrderNumber::new("NP", year, 1234),
                status: OrderStatus::Paid,
                payment_intent_id: None,
            })
            .await
            .unwrap();

        let suffixes = Arc::new(Mutex::new(VecDeque::from([1234_u16, 1234, 5678])));
        let checkout = h.checkout.clone().with_suffixes(Arc::new(move || {
            suffixes.lock().unwrap().pop_front().unwrap_or(9999)
        }));
        let mut ctx = cart_with("100", 1);
        checkout.request_intent(h.user_id, &mut ctx).await.unwrap();

        let order = checkout.confirm(h.user_id, &mut ctx, &card()).await.unwrap();
        assert_eq!(order.order_number, OrderNumber::new("NP", year, 5678));
        assert_eq!(h.ledger.len().await, 2);
    }

    #[tokio::test]
    async fn test_abandoned_intent_paid_anyway_is_recorded() {
        let h = harness().await;
        let mut ctx = cart_with("100", 1);
        h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();

        ctx.abandon_pending_intent();
        ctx.cart
            .add(
                ProductId::new(1),
                "10".parse().unwrap(),
                "Nike Air Max 90",
                "120".parse().unwrap(),
                1,
            )
            .unwrap();

        let order = h.checkout.complete(h.user_id, &mut ctx, "pi_1").await.unwrap();
        assert_eq!(order.total, "113".parse().unwrap());
        assert_eq!(order.items.len(), 1);
        // The newer cart is untouched.
        assert_eq!(ctx.cart.lines().len(), 2);

        let err = h
            .checkout
            .complete(h.user_id, &mut CheckoutContext::default(), "pi_unknown")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_old_success_page_leaves_pending_intent_alone() {
        let h = harness().await;
        let mut ctx = cart_with("100", 1);
        h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();
        let first = h.checkout.confirm(h.user_id, &mut ctx, &card()).await.unwrap();

        ctx.cart
            .add(
                ProductId::new(1),
                "10".parse().unwrap(),
                "Nike Air Max 90",
                "120".parse().unwrap(),
                1,
            )
            .unwrap();
        h.checkout.request_intent(h.user_id, &mut ctx).await.unwrap();

        let reloaded = h.checkout.complete(h.user_id, &mut ctx, "pi_1").await.unwrap();
        assert_eq!(reloaded.id, first.id);
        assert_eq!(ctx.state.held_intent().unwrap().intent_id, "pi_2");
        assert_eq!(ctx.cart.lines().len(), 1);

        let second = h.checkout.confirm(h.user_id, &mut ctx, &card()).await.unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.payment_intent_id.as_deref(), Some("pi_2"));
        assert_eq!(second.total, "135.6".parse().unwrap());
        assert_eq!(h.ledger.len().await, 2);
    }
}
