//! Session-stored types.
//!
//! The session carries who is logged in and the shopper's checkout context.
//! Both are plain values: handlers load them, pass them explicitly to the
//! services, and write them back.

use serde::{Deserialize, Serialize};

use sole_core::cart::{Cart, CartLine};
use sole_core::pricing::Totals;
use sole_core::{CurrencyCode, Email, OrderId, OrderNumber, UserId};

/// Session-stored user identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
}

/// A payment intent the checkout is waiting on, together with the priced
/// snapshot of the cart it was created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeldIntent {
    pub intent_id: String,
    pub client_secret: String,
    pub amount_minor: i64,
    pub currency: CurrencyCode,
    pub lines: Vec<CartLine>,
    pub totals: Totals,
}

/// Where a shopper is in checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    /// Profile is missing first name, last name or date of birth.
    #[default]
    AwaitingProfile,
    /// Profile is complete; no payment intent yet.
    AwaitingIntent,
    /// An intent exists and the shopper has to pay it.
    AwaitingPayment { intent: HeldIntent },
    /// Payment succeeded; the order is being recorded.
    Settling { intent: HeldIntent },
    /// Order recorded and cart cleared.
    Completed {
        order_id: OrderId,
        order_number: OrderNumber,
        payment_intent_id: String,
    },
    /// The cart changed under a pending intent. The gateway expires the
    /// intent; the snapshot is kept in case the shopper paid it anyway.
    Abandoned { intent: HeldIntent },
}

impl CheckoutState {
    /// Intent currently held, if any.
    #[must_use]
    pub const fn held_intent(&self) -> Option<&HeldIntent> {
        match self {
            Self::AwaitingPayment { intent } | Self::Settling { intent } => Some(intent),
            _ => None,
        }
    }

    /// Intent with this id that checkout still knows the priced snapshot of,
    /// including an abandoned one.
    #[must_use]
    pub fn intent_for(&self, intent_id: &str) -> Option<&HeldIntent> {
        match self {
            Self::AwaitingPayment { intent }
            | Self::Settling { intent }
            | Self::Abandoned { intent } => (intent.intent_id == intent_id).then_some(intent),
            _ => None,
        }
    }

    /// Short name for logs and responses.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AwaitingProfile => "awaiting_profile",
            Self::AwaitingIntent => "awaiting_intent",
            Self::AwaitingPayment { .. } => "awaiting_payment",
            Self::Settling { .. } => "settling",
            Self::Completed { .. } => "completed",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

/// Cart plus checkout state, kept together in the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutContext {
    pub cart: Cart,
    pub state: CheckoutState,
}

impl CheckoutContext {
    /// Drop a pending intent after the cart changed underneath it.
    ///
    /// Completed and other states are left alone.
    pub fn abandon_pending_intent(&mut self) {
        if let CheckoutState::AwaitingPayment { intent } = &self.state {
            tracing::info!(payment_intent_id = %intent.intent_id, "Cart changed, abandoning payment intent");
            self.state = CheckoutState::Abandoned {
                intent: intent.clone(),
            };
        }
    }
}

/// Session keys.
pub mod keys {
    /// Key for storing the current logged-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the cart and checkout state.
    pub const CHECKOUT: &str = "checkout";
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sole_core::ProductId;
    use sole_core::pricing::TaxRate;

    use super::*;

    fn held(intent_id: &str) -> HeldIntent {
        let mut cart = Cart::new();
        cart.add(
            ProductId::new(1),
            "9".parse().unwrap(),
            "Nike Air Max 90",
            "120".parse().unwrap(),
            1,
        )
        .unwrap();
        let totals = cart.totals(TaxRate::NEPAL_VAT);
        HeldIntent {
            intent_id: intent_id.to_string(),
            client_secret: format!("{intent_id}_secret_x"),
            amount_minor: totals.total_minor_units(CurrencyCode::Usd).unwrap(),
            currency: CurrencyCode::Usd,
            lines: cart.lines().to_vec(),
            totals,
        }
    }

    #[test]
    fn test_abandon_only_affects_pending_payment() {
        let mut ctx = CheckoutContext::default();
        ctx.abandon_pending_intent();
        assert_eq!(ctx.state, CheckoutState::AwaitingProfile);

        ctx.state = CheckoutState::AwaitingPayment {
            intent: held("pi_1"),
        };
        ctx.abandon_pending_intent();
        assert_eq!(ctx.state.name(), "abandoned");
        assert!(ctx.state.held_intent().is_none());
        assert!(ctx.state.intent_for("pi_1").is_some());
        assert!(ctx.state.intent_for("pi_2").is_none());
    }

    #[test]
    fn test_context_survives_session_round_trip() {
        let ctx = CheckoutContext {
            cart: Cart::new(),
            state: CheckoutState::AwaitingPayment {
                intent: held("pi_9"),
            },
        };
        let json = serde_json::to_value(&ctx).unwrap();
        assert_eq!(json["state"]["state"], "awaiting_payment");

        let back: CheckoutContext = serde_json::from_value(json).unwrap();
        assert_eq!(back, ctx);
    }
}
